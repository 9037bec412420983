//! Token based AMD collaborators
//!
//! [`AmdScanner`] and [`ScanEvaluator`] give the build core something to work
//! with when no JavaScript engine is embedded. They recognise `define` and
//! `require` calls by scanning tokens, which covers the declarations the core
//! needs for ordering. [`ScanEvaluator`] records factory invocations instead
//! of running them.

use std::{cell::RefCell, fmt::Write as _, rc::Rc};

use anyhow::{Context, bail};
use indexmap::IndexMap;
use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::{
    collaborators::{
        Artifact, Definition, Evaluator, ExecMode, ExtractOptions, PragmaPhase, SourceProcessor,
    },
    config::BuildConfig,
    error::ParseError,
    scan::{Token, tokenize},
};

static PRAGMA_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"//>>\s*(exclude|include)Start\s*\(\s*["']([^"']+)["'][^\n]*"#)
        .expect("pragma pattern is valid")
});

#[derive(Debug, Default)]
struct DefineCall<'a> {
    name: Option<&'a str>,
    deps: Vec<&'a str>,
}

/// Module system calls found in a source
#[derive(Debug, Default)]
struct CallScan<'a> {
    defines: Vec<DefineCall<'a>>,
    requires: Vec<&'a str>,
    needs_define: Vec<&'a str>,
}

fn is_call(tokens: &[Token<'_>], idx: usize) -> bool {
    matches!(tokens.get(idx + 1), Some(Token::Punct('(')))
}

fn follows_dot(tokens: &[Token<'_>], idx: usize) -> bool {
    idx > 0 && tokens[idx - 1] == Token::Punct('.')
}

/// Index of the `close` punctuation balancing the `open_ch` at `open`
fn matching(tokens: &[Token<'_>], open: usize, open_ch: char, close: char) -> usize {
    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Punct(c) if *c == open_ch => depth += 1,
            Token::Punct(c) if *c == close => {
                depth -= 1;
                if depth == 0 {
                    return idx;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

/// Value of an `if (has('flag')) {` or `if (!has('flag')) {` test at `idx`,
/// with the index of the opening brace, when the flag is known
fn has_condition(
    tokens: &[Token<'_>],
    idx: usize,
    has: &IndexMap<String, bool>,
) -> Option<(bool, usize)> {
    let [Token::Ident("if"), Token::Punct('('), rest @ ..] = &tokens[idx..] else {
        return None;
    };
    let (negated, rest) = match rest {
        [Token::Punct('!'), rest @ ..] => (true, rest),
        _ => (false, rest),
    };
    let [
        Token::Ident("has"),
        Token::Punct('('),
        Token::Str(flag),
        Token::Punct(')'),
        Token::Punct(')'),
        Token::Punct('{'),
        ..,
    ] = rest
    else {
        return None;
    };
    let value = *has.get(*flag)?;
    Some((value != negated, tokens.len() - rest.len() + 5))
}

/// Drop the branches of `has()` tests decided by build-time feature flags
///
/// Only braced branches are pruned. A dead `if` block is removed and its
/// `else` block kept as a plain block; a live one loses its `else` block.
/// `else if` chains after a live branch are left alone.
fn prune_has_branches<'a>(tokens: &[Token<'a>], has: &IndexMap<String, bool>) -> Vec<Token<'a>> {
    if has.is_empty() {
        return tokens.to_vec();
    }
    let mut kept = Vec::with_capacity(tokens.len());
    let mut idx = 0;
    while idx < tokens.len() {
        let Some((live, open)) = has_condition(tokens, idx, has) else {
            kept.push(tokens[idx]);
            idx += 1;
            continue;
        };
        let close = matching(tokens, open, '{', '}').min(tokens.len() - 1);
        if live {
            kept.extend_from_slice(&tokens[idx..=close]);
        }
        idx = close + 1;
        if tokens.get(idx) == Some(&Token::Ident("else")) {
            if !live {
                idx += 1;
            } else if tokens.get(idx + 1) == Some(&Token::Punct('{')) {
                idx = matching(tokens, idx + 1, '{', '}') + 1;
            }
        }
    }
    kept
}

/// String elements of the array literal opening at `open`
fn string_array<'a>(tokens: &[Token<'a>], open: usize) -> Vec<&'a str> {
    tokens[open + 1..]
        .iter()
        .take_while(|token| **token != Token::Punct(']'))
        .filter_map(Token::as_str_literal)
        .collect()
}

fn parse_define<'a>(tokens: &[Token<'a>], idx: usize) -> DefineCall<'a> {
    let mut call = DefineCall::default();
    let mut arg = idx + 2;

    if let (Some(Token::Str(name)), Some(Token::Punct(','))) = (tokens.get(arg), tokens.get(arg + 1)) {
        call.name = Some(*name);
        arg += 2;
    }

    match tokens.get(arg) {
        Some(Token::Punct('[')) => call.deps = string_array(tokens, arg),
        Some(Token::Ident("function")) => {
            // CommonJS sugar: `require('x')` inside the factory body
            let end = matching(tokens, idx + 1, '(', ')');
            let body = &tokens[arg..end.min(tokens.len())];
            for (pos, token) in body.iter().enumerate() {
                if let (
                    Token::Ident("require"),
                    Some(Token::Punct('(')),
                    Some(Token::Str(dep)),
                    Some(Token::Punct(')')),
                ) = (token, body.get(pos + 1), body.get(pos + 2), body.get(pos + 3))
                {
                    if !follows_dot(body, pos) {
                        call.deps.push(*dep);
                    }
                }
            }
        }
        _ => {}
    }
    call
}

fn scan_calls<'a>(tokens: &[Token<'a>], find_nested: bool) -> CallScan<'a> {
    let mut scan = CallScan::default();
    let mut depth = 0usize;

    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::Punct('{') => depth += 1,
            Token::Punct('}') => depth = depth.saturating_sub(1),
            Token::Ident("define") if is_call(tokens, idx) && !follows_dot(tokens, idx) => {
                scan.defines.push(parse_define(tokens, idx));
            }
            Token::Ident("require" | "requirejs")
                if is_call(tokens, idx)
                    && !follows_dot(tokens, idx)
                    && (depth == 0 || find_nested)
                    && tokens.get(idx + 2) == Some(&Token::Punct('[')) =>
            {
                for dep in string_array(tokens, idx + 2) {
                    if !scan.requires.contains(&dep) {
                        scan.requires.push(dep);
                    }
                }
            }
            Token::Ident("needsDefine") if is_call(tokens, idx) && follows_dot(tokens, idx) => {
                if let Some(Token::Str(name)) = tokens.get(idx + 2) {
                    scan.needs_define.push(*name);
                }
            }
            _ => {}
        }
    }
    scan
}

/// Turn scanned calls into the declarations made for `module_name`
///
/// `require([...])` dependencies become dependencies of the module's own
/// declaration. A source without any `define` gets a synthesized declaration
/// when `insert_define` is set.
fn declarations(module_name: &str, scan: &CallScan<'_>, insert_define: bool) -> Vec<Definition> {
    let mut definitions: Vec<Definition> = scan
        .defines
        .iter()
        .map(|call| Definition {
            name: call.name.map(str::to_owned),
            deps: call.deps.iter().map(|dep| (*dep).to_owned()).collect(),
            needs_define: call.name.is_some_and(|name| scan.needs_define.contains(&name)),
        })
        .collect();

    let requires: Vec<String> = scan.requires.iter().map(|dep| (*dep).to_owned()).collect();
    let own = definitions
        .iter()
        .position(|def| def.name.as_deref().is_none_or(|name| name == module_name));

    match own {
        Some(idx) => {
            let deps = &mut definitions[idx].deps;
            for dep in requires {
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }
        None if insert_define && scan.defines.is_empty() => definitions.push(Definition {
            name: Some(module_name.to_owned()),
            deps: requires,
            needs_define: true,
        }),
        None if !requires.is_empty() => definitions.push(Definition::anonymous(requires)),
        None => {}
    }
    definitions
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn render(definitions: &[Definition]) -> String {
    let mut out = String::new();
    for definition in definitions {
        let deps = definition
            .deps
            .iter()
            .map(|dep| quoted(dep))
            .collect::<Vec<_>>()
            .join(", ");
        match &definition.name {
            Some(name) => {
                if definition.needs_define {
                    let _ = writeln!(out, "require.needsDefine({});", quoted(name));
                }
                let _ = writeln!(out, "define({}, [{deps}]);", quoted(name));
            }
            None => {
                let _ = writeln!(out, "define([{deps}]);");
            }
        }
    }
    out
}

/// Static extraction, bootstrap detection and pragma stripping by token scan
#[derive(Debug, Clone, Copy, Default)]
pub struct AmdScanner;

impl SourceProcessor for AmdScanner {
    fn strip_conditionals(
        &self,
        url: &str,
        text: &str,
        config: &BuildConfig,
        phase: PragmaPhase,
    ) -> anyhow::Result<String> {
        trace!("Stripping pragmas ({phase:?}) from {url}");
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(caps) = PRAGMA_START_RE.captures(rest) {
            let marker = caps.get(0).context("pragma match has a full capture")?;
            let kind = &caps[1];
            let name = &caps[2];
            let end_re = Regex::new(&format!(
                r#"//>>\s*{kind}End\s*\(\s*["']{}["']\s*\)[^\n]*"#,
                regex::escape(name)
            ))?;
            let body = &rest[marker.end()..];
            let Some(end) = end_re.find(body) else {
                bail!("{url}: {kind}Start(\"{name}\") has no matching {kind}End");
            };

            let flag = config.pragmas.get(name).copied().unwrap_or(false);
            let remove = if kind == "exclude" { flag } else { !flag };
            if remove {
                result.push_str(&rest[..marker.start()]);
                rest = &body[end.end()..];
            } else {
                result.push_str(&rest[..marker.end()]);
                rest = body;
            }
        }

        result.push_str(rest);
        Ok(result)
    }

    fn static_extract(
        &self,
        module_name: &str,
        _url: &str,
        text: &str,
        options: ExtractOptions<'_>,
    ) -> Result<String, ParseError> {
        let tokens = prune_has_branches(&tokenize(text)?, options.has);
        let scan = scan_calls(&tokens, options.find_nested);
        Ok(render(&declarations(module_name, &scan, options.insert_define)))
    }

    fn detects_bootstrap(&self, _url: &str, text: &str) -> Result<bool, ParseError> {
        let tokens = tokenize(text)?;
        Ok(tokens.iter().enumerate().any(|(idx, token)| match token {
            Token::Ident("requirejs") => {
                let declared = idx > 0
                    && matches!(
                        tokens[idx - 1],
                        Token::Ident("var" | "let" | "const" | "function")
                    );
                let assigned = !follows_dot(&tokens, idx)
                    && tokens.get(idx + 1) == Some(&Token::Punct('='))
                    && tokens.get(idx + 2) != Some(&Token::Punct('='));
                declared || assigned
            }
            Token::Ident("require") => idx > 0 && tokens[idx - 1] == Token::Ident("function"),
            _ => false,
        }))
    }
}

/// Wrap sources that use CommonJS `require`/`exports` but never call `define`
pub fn wrap_commonjs(_url: &str, text: &str) -> anyhow::Result<String> {
    let Ok(tokens) = tokenize(text) else {
        // leave it for extraction to report
        return Ok(text.to_owned());
    };
    let defines = tokens
        .iter()
        .enumerate()
        .any(|(idx, token)| *token == Token::Ident("define") && is_call(&tokens, idx));
    let commonjs = tokens
        .iter()
        .any(|token| matches!(token, Token::Ident("require" | "exports" | "module")));

    if defines || !commonjs {
        return Ok(text.to_owned());
    }
    Ok(format!(
        "define(function (require, exports, module) {{\n{text}\n}});\n"
    ))
}

#[derive(Debug, Default)]
struct EvaluationLog {
    evaluated: Vec<(String, ExecMode)>,
    executed: Vec<String>,
}

/// Evaluator that reads declarations by token scan and records executions
///
/// Clones share their log, so a caller can keep one to inspect what a
/// session evaluated.
#[derive(Debug, Clone, Default)]
pub struct ScanEvaluator {
    log: Rc<RefCell<EvaluationLog>>,
    resource_deps: FxHashMap<String, Vec<String>>,
}

impl ScanEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dependencies reported when any plugin loads `resource`
    #[must_use]
    pub fn with_resource_deps(mut self, resource: &str, deps: &[&str]) -> Self {
        self.resource_deps.insert(
            resource.to_owned(),
            deps.iter().map(|dep| (*dep).to_owned()).collect(),
        );
        self
    }

    /// Modules whose contents were evaluated, in order
    pub fn evaluated(&self) -> Vec<(String, ExecMode)> {
        self.log.borrow().evaluated.clone()
    }

    /// Modules whose factory ran, in order
    pub fn executed(&self) -> Vec<String> {
        self.log.borrow().executed.clone()
    }
}

impl Evaluator for ScanEvaluator {
    fn evaluate(
        &mut self,
        module_name: &str,
        url: &str,
        contents: &str,
        mode: ExecMode,
    ) -> anyhow::Result<Vec<Definition>> {
        self.log
            .borrow_mut()
            .evaluated
            .push((module_name.to_owned(), mode));
        let tokens = tokenize(contents).with_context(|| format!("Cannot evaluate {url}"))?;
        let scan = scan_calls(&tokens, mode == ExecMode::Full);
        Ok(declarations(module_name, &scan, false))
    }

    fn execute(&mut self, id: &str, deps: &[String]) -> anyhow::Result<Artifact> {
        self.log.borrow_mut().executed.push(id.to_owned());
        Ok(Artifact::new(format!("{id}({})", deps.join(", "))))
    }

    fn load_resource(&mut self, _plugin_id: &str, resource: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.resource_deps.get(resource).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn extract_with(module_name: &str, text: &str, has: &[(&str, bool)], find_nested: bool) -> String {
        let has: IndexMap<String, bool> = has
            .iter()
            .map(|(flag, value)| ((*flag).to_owned(), *value))
            .collect();
        AmdScanner
            .static_extract(
                module_name,
                "test.js",
                text,
                ExtractOptions {
                    insert_define: true,
                    has: &has,
                    find_nested,
                },
            )
            .expect("extraction should succeed")
    }

    fn extract(module_name: &str, text: &str) -> String {
        extract_with(module_name, text, &[], false)
    }

    #[test]
    fn test_extract_anonymous_define() {
        assert_eq!(
            extract("app/main", "define(['./util', 'jquery'], function (util, $) { return {}; });"),
            "define([\"./util\", \"jquery\"]);\n"
        );
    }

    #[test]
    fn test_extract_named_defines_and_requires() {
        let source = r#"
            define("lib/a", [], function () {});
            define("lib", ["lib/a"], function () {});
            require(["boot"]);
            function later() { require(["lazy"]); }
        "#;
        assert_eq!(
            extract("lib", source),
            "define(\"lib/a\", []);\ndefine(\"lib\", [\"lib/a\", \"boot\"]);\n"
        );
    }

    #[test]
    fn test_extract_commonjs_sugar() {
        let source = "define(function (require) { var a = require('a'); var b = x.require('b'); });";
        assert_eq!(extract("m", source), "define([\"a\"]);\n");
    }

    #[test]
    fn test_extract_inserts_needs_define() {
        assert_eq!(
            extract("legacy", "window.legacy = {}; require(['dep']);"),
            "require.needsDefine(\"legacy\");\ndefine(\"legacy\", [\"dep\"]);\n"
        );
    }

    #[test]
    fn test_extract_prunes_decided_has_branches() {
        let source = r#"
            define(['a'], function () {
                if (has('dev')) { require(['devtools']); }
                if (!has('prod')) { require(['fallback']); } else { require(['prodOnly']); }
                if (has('prod')) { require(['cdn']); } else { require(['local']); }
                if (has('unknown')) { require(['maybe']); }
            });
        "#;
        assert_eq!(
            extract_with("m", source, &[("dev", false), ("prod", true)], true),
            "define([\"a\", \"prodOnly\", \"cdn\", \"maybe\"]);\n"
        );
        assert_eq!(
            extract_with("m", source, &[], true),
            "define([\"a\", \"devtools\", \"fallback\", \"prodOnly\", \"cdn\", \"local\", \"maybe\"]);\n"
        );
    }

    #[test]
    fn test_extract_ignores_quotes_in_regex_literals() {
        assert_eq!(
            extract("m", "define(['dep'], function (dep) { return s.replace(/'/g, ''); });"),
            "define([\"dep\"]);\n"
        );
    }

    #[test]
    fn test_extracted_contents_evaluate_to_the_same_declarations() {
        let mut evaluator = ScanEvaluator::new();
        let extracted = extract("legacy", "window.legacy = {};");
        let definitions = evaluator
            .evaluate("legacy", "legacy.js", &extracted, ExecMode::Static)
            .expect("evaluate");
        assert_eq!(
            definitions,
            vec![Definition {
                name: Some("legacy".to_owned()),
                deps: vec![],
                needs_define: true,
            }]
        );
        assert_eq!(
            evaluator.evaluated(),
            vec![("legacy".to_owned(), ExecMode::Static)]
        );
    }

    #[test]
    fn test_full_evaluation_sees_nested_requires() {
        let mut evaluator = ScanEvaluator::new();
        let definitions = evaluator
            .evaluate(
                "plugin",
                "plugin.js",
                "define({ load: function () { require(['helper']); } });",
                ExecMode::Full,
            )
            .expect("evaluate");
        assert_eq!(definitions, vec![Definition::anonymous(vec!["helper".to_owned()])]);
    }

    #[test]
    fn test_detects_bootstrap() {
        assert!(AmdScanner.detects_bootstrap("r.js", "var requirejs, require, define;").expect("scan"));
        assert!(AmdScanner.detects_bootstrap("r.js", "requirejs = function () {};").expect("scan"));
        assert!(AmdScanner.detects_bootstrap("r.js", "function require(deps) {}").expect("scan"));
        assert!(!AmdScanner.detects_bootstrap("a.js", "define(['require'], function (require) {});").expect("scan"));
        assert!(!AmdScanner.detects_bootstrap("a.js", "if (requirejs === undefined) {}").expect("scan"));
        assert!(!AmdScanner.detects_bootstrap("a.js", "// var requirejs").expect("scan"));
    }

    #[test]
    fn test_strip_conditionals() {
        let config = BuildConfig {
            pragmas: [("excludeDebug".to_owned(), true)].into_iter().collect(),
            ..Default::default()
        };
        let source = "a();\n//>>excludeStart(\"excludeDebug\", pragmas.excludeDebug);\ndebug();\n//>>excludeEnd(\"excludeDebug\");\nb();\n//>>includeStart(\"extras\", pragmas.extras);\nextras();\n//>>includeEnd(\"extras\");\nc();\n";
        let stripped = AmdScanner
            .strip_conditionals("a.js", source, &config, PragmaPhase::OnExecute)
            .expect("strip");
        assert_eq!(stripped, "a();\n\nb();\n\nc();\n");
    }

    #[test]
    fn test_strip_conditionals_keeps_blocks_when_flag_allows() {
        let source = "//>>excludeStart(\"x\", true);\nkept();\n//>>excludeEnd(\"x\");\n";
        let stripped = AmdScanner
            .strip_conditionals("a.js", source, &BuildConfig::default(), PragmaPhase::OnExecute)
            .expect("strip");
        assert_eq!(stripped, source);
    }

    #[test]
    fn test_strip_conditionals_unterminated() {
        let err = AmdScanner
            .strip_conditionals(
                "a.js",
                "//>>excludeStart(\"x\", true);\nnever closed",
                &BuildConfig::default(),
                PragmaPhase::OnExecute,
            )
            .expect_err("should fail");
        assert!(err.to_string().contains("excludeStart(\"x\")"));
    }

    #[test]
    fn test_wrap_commonjs() {
        let wrapped = wrap_commonjs("c.js", "var dep = require('dep');\nexports.x = dep;")
            .expect("wrap");
        assert_eq!(
            wrapped,
            "define(function (require, exports, module) {\nvar dep = require('dep');\nexports.x = dep;\n});\n"
        );
        let amd = "define([], function () {});";
        assert_eq!(wrap_commonjs("a.js", amd).expect("wrap"), amd);
        let script = "window.x = 1;";
        assert_eq!(wrap_commonjs("s.js", script).expect("wrap"), script);
    }
}
