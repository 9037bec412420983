//! Lightweight JavaScript tokenizer
//!
//! Good enough to find module declarations and plugin builder hints without
//! being fooled by text that sits inside comments or string literals. It does
//! not build a syntax tree and does not decode escape sequences.

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Identifier, keyword or numeric literal
    Ident(&'a str),
    /// String or template literal, without its quotes
    Str(&'a str),
    /// Regular expression literal, slashes and flags included
    Regex(&'a str),
    Punct(char),
}

impl<'a> Token<'a> {
    pub fn as_str_literal(&self) -> Option<&'a str> {
        match self {
            Token::Str(value) => Some(*value),
            _ => None,
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Keywords after which a `/` opens a regular expression
const REGEX_AFTER_KEYWORDS: [&str; 14] = [
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Whether a `/` following `previous` starts a regex literal rather than a division
fn starts_regex(previous: Option<&Token<'_>>) -> bool {
    match previous {
        None => true,
        Some(Token::Ident(word)) => REGEX_AFTER_KEYWORDS.contains(word),
        Some(Token::Str(_) | Token::Regex(_) | Token::Punct(')' | ']')) => false,
        Some(Token::Punct(_)) => true,
    }
}

/// Split `source` into tokens, skipping whitespace and comments
pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut line = 1usize;

    while let Some((start, c)) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let opened_at = line;
                let mut closed = false;
                let mut prev = '\0';
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                    }
                    if prev == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    prev = c;
                }
                if !closed {
                    return Err(ParseError::new(format!(
                        "Unterminated comment starting on line {opened_at}"
                    )));
                }
            }
            '/' if starts_regex(tokens.last()) => {
                let mut in_class = false;
                let mut end = None;
                while let Some((idx, c)) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '\n' => break,
                        '[' => in_class = true,
                        ']' => in_class = false,
                        '/' if !in_class => {
                            end = Some(idx + 1);
                            break;
                        }
                        _ => {}
                    }
                }
                let Some(mut end) = end else {
                    return Err(ParseError::new(format!(
                        "Unterminated regular expression on line {line}"
                    )));
                };
                while let Some(&(idx, flag)) = chars.peek() {
                    if !is_ident_char(flag) {
                        break;
                    }
                    end = idx + flag.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Regex(&source[start..end]));
            }
            '"' | '\'' | '`' => {
                let quote = c;
                let opened_at = line;
                let mut end = None;
                while let Some((idx, c)) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '\n' if quote != '`' => break,
                        '\n' => line += 1,
                        c if c == quote => {
                            end = Some(idx);
                            break;
                        }
                        _ => {}
                    }
                }
                let Some(end) = end else {
                    return Err(ParseError::new(format!(
                        "Unterminated string literal on line {opened_at}"
                    )));
                };
                tokens.push(Token::Str(&source[start + 1..end]));
            }
            c if is_ident_char(c) => {
                let mut end = start + c.len_utf8();
                while let Some(&(idx, next)) = chars.peek() {
                    if !is_ident_char(next) {
                        break;
                    }
                    end = idx + next.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Ident(&source[start..end]));
            }
            c => tokens.push(Token::Punct(c)),
        }
    }

    Ok(tokens)
}

fn is_builder_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\'')
}

/// Find a `pluginBuilder: "id"` or `pluginBuilder = 'id'` declaration
///
/// Sources that fail to tokenize are treated as having no builder; the
/// extraction step reports the syntax problem.
pub fn find_plugin_builder(source: &str) -> Option<String> {
    let tokens = tokenize(source).ok()?;
    tokens.windows(3).find_map(|window| match window {
        [
            Token::Ident("pluginBuilder") | Token::Str("pluginBuilder"),
            Token::Punct('=' | ':'),
            Token::Str(name),
        ] if is_builder_name(name) => Some((*name).to_owned()),
        _ => None,
    })
}
