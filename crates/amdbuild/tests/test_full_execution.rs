use amdbuild::{
    amd_scan::{AmdScanner, ScanEvaluator},
    collaborators::{Artifact, ExecMode, ReadHooks},
    config::BuildConfig,
    context::{ModuleState, ProcessedModule},
    error::ErrorKind,
    host::MemoryFileSystem,
    session::{BuildSession, Collaborators},
};
use pretty_assertions::assert_eq;

fn session(
    files: &[(&str, &str)],
    evaluator: ScanEvaluator,
) -> (BuildSession, MemoryFileSystem, ScanEvaluator) {
    let fs = MemoryFileSystem::new();
    for (url, contents) in files {
        fs.insert(url, contents);
    }
    let config = BuildConfig {
        base_url: "src/".to_owned(),
        ..BuildConfig::default()
    };
    let io = Collaborators::new(fs.clone(), AmdScanner, evaluator.clone())
        .with_hooks(ReadHooks::default());
    (BuildSession::new(config, io), fs, evaluator)
}

fn evaluated(module: &str, mode: ExecMode) -> (String, ExecMode) {
    (module.to_owned(), mode)
}

const PLUGIN_FILES: &[(&str, &str)] = &[
    ("src/main.js", "define(['loader!a'], function (a) {});"),
    (
        "src/loader.js",
        "define({ pluginBuilder: './loaderBuilder', load: function (name, req, onload) { req([name], onload); } });",
    ),
    (
        "src/loaderBuilder.js",
        "define(['helper'], function (helper) { return { load: function () {} }; });",
    ),
    ("src/helper.js", "define([], function () {});"),
    ("src/b.js", "define([], function () {});"),
];

#[test]
fn test_plugin_builder_replaces_plugin_source() {
    let (mut session, fs, evaluator) =
        session(PLUGIN_FILES, ScanEvaluator::new().with_resource_deps("a", &["b"]));

    session.require(&["main"]).unwrap();

    assert!(session.plugins().is_plugin("loader"));
    assert_eq!(session.plugins().builder_of("loader"), Some("loaderBuilder"));
    assert!(session.classifier().needs_full_exec("loader"));
    assert!(session.classifier().is_fully_executed("loader"));
    assert_eq!(
        session.cache().get("src/loader.js"),
        Some(PLUGIN_FILES[2].1),
        "the plugin is cached under its own url with the builder's source"
    );

    assert_eq!(
        session.layer().build_file_paths(),
        ["src/helper.js", "src/loader.js", "src/b.js", "loader!a", "src/main.js"]
    );
    assert_eq!(
        session
            .layer()
            .build_path_map()
            .get("loader!a")
            .map(String::as_str),
        Some("loader!a")
    );
    assert!(session.layer().modules_with_names().contains("loader!a"));
    assert_eq!(fs.read_count("src/loader.js"), 1);
    assert_eq!(fs.read_count("src/loaderBuilder.js"), 1);

    assert_eq!(
        evaluator.evaluated(),
        [
            evaluated("main", ExecMode::Static),
            evaluated("loader", ExecMode::Full),
            evaluated("helper", ExecMode::Full),
            evaluated("b", ExecMode::Static),
        ]
    );
    assert_eq!(evaluator.executed(), ["helper", "loader"]);
    assert_eq!(
        session.context().record("loader").and_then(|r| r.processed.clone()),
        Some(ProcessedModule::FullyExecuted(
            Artifact::new("loader(helper)")
        ))
    );
    assert_eq!(
        session.context().record("main").and_then(|r| r.processed.clone()),
        Some(ProcessedModule::StaticDependencies(vec!["loader!a".to_owned()]))
    );
}

#[test]
fn test_fully_executed_plugins_reuse_cache_in_later_layers() {
    let (mut session, fs, _) = session(PLUGIN_FILES, ScanEvaluator::new());

    session.require(&["main"]).unwrap();
    session.reset_layer();
    session.require(&["loader!other"]).unwrap();

    assert_eq!(
        session.layer().build_file_paths(),
        ["src/helper.js", "src/loader.js", "loader!other"]
    );
    assert_eq!(fs.read_count("src/loader.js"), 1);
    assert_eq!(fs.read_count("src/loaderBuilder.js"), 1);
    assert_eq!(fs.read_count("src/helper.js"), 1);
}

#[test]
fn test_static_module_is_reloaded_for_full_execution() {
    let (mut session, fs, evaluator) = session(
        &[
            ("src/main.js", "define(['shared', 'loader!x'], function () {});"),
            ("src/shared.js", "define([], function () { return {}; });"),
            (
                "src/loader.js",
                "define(['shared'], function (shared) { return { load: function () {} }; });",
            ),
        ],
        ScanEvaluator::new(),
    );

    session.require(&["main"]).unwrap();

    assert_eq!(fs.read_count("src/shared.js"), 2, "reprocessed from raw source");
    assert_eq!(
        session.cache().get("src/shared.js"),
        Some("define([], function () { return {}; });")
    );
    assert!(session.classifier().is_fully_executed("shared"));
    assert_eq!(
        evaluator.evaluated(),
        [
            evaluated("main", ExecMode::Static),
            evaluated("shared", ExecMode::Static),
            evaluated("loader", ExecMode::Full),
            evaluated("shared", ExecMode::Full),
        ]
    );
    assert_eq!(evaluator.executed(), ["shared", "loader"]);
    assert_eq!(
        session.layer().build_file_paths(),
        ["src/shared.js", "src/loader.js", "loader!x", "src/main.js"]
    );
}

#[test]
fn test_repeated_invalidation_hits_reload_cap() {
    let (mut session, fs, _) =
        session(&[("src/a.js", "define([], function () {});")], ScanEvaluator::new());
    session.classifier_mut().mark_needs_full_exec("a");

    session.require(&["a"]).unwrap();
    assert!(session.classifier().is_fully_executed("a"));

    assert!(session.classifier_mut().invalidate("a"));
    session.require(&["a"]).unwrap();
    assert_eq!(fs.read_count("src/a.js"), 2);
    assert_eq!(session.context().state("a"), Some(ModuleState::Completed));

    assert!(session.classifier_mut().invalidate("a"));
    let err = session.require(&["a"]).unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::ReloadCycle { id, reloads: 1 } if id == "a"),
        "unexpected error: {err}"
    );
    assert_eq!(fs.read_count("src/a.js"), 2);
}

#[test]
fn test_reload_counter_starts_over_each_layer() {
    let (mut session, _, _) =
        session(&[("src/a.js", "define([], function () {});")], ScanEvaluator::new());
    session.classifier_mut().mark_needs_full_exec("a");
    session.require(&["a"]).unwrap();

    for _ in 0..3 {
        session.reset_layer();
        session.require(&["a"]).unwrap();
        session.classifier_mut().invalidate("a");
        session.require(&["a"]).unwrap();
    }
    assert!(session.context().is_defined("a"));
}

#[test]
fn test_plugin_needed_by_its_own_dependency_is_not_ready() {
    let (mut session, _, _) = session(
        &[(
            "src/loader.js",
            "define(['loader!z'], function () { return { load: function () {} }; });",
        )],
        ScanEvaluator::new(),
    );

    let err = session.require(&["loader!y"]).unwrap_err();

    assert!(matches!(
        err.kind(),
        ErrorKind::PluginNotReady { plugin, resource } if plugin == "loader" && resource == "z"
    ));
    assert_eq!(err.file_name(), Some("src/loader.js"));
    assert_eq!(err.module_trail(), ["loader"]);
    assert_eq!(session.context().state("loader!y"), Some(ModuleState::Failed));
}

#[test]
fn test_plugin_dependencies_inherit_full_execution() {
    let (mut session, _, evaluator) = session(
        &[
            (
                "src/loader.js",
                "define(['util/a'], function (a) { return { load: function () {} }; });",
            ),
            ("src/util/a.js", "define(['./b'], function (b) {});"),
            ("src/util/b.js", "define([], function () {});"),
        ],
        ScanEvaluator::new(),
    );

    session.require(&["loader!res"]).unwrap();

    for id in ["loader", "util/a", "util/b"] {
        assert!(session.classifier().is_fully_executed(id), "{id}");
    }
    assert_eq!(session.classifier().pending_full_exec().count(), 0);
    assert_eq!(evaluator.executed(), ["util/b", "util/a", "loader"]);
}

#[test]
fn test_plugin_builder_found_after_regex_literal() {
    let (mut session, fs, _) = session(
        &[
            ("src/main.js", "define(['loader!a'], function (a) {});"),
            (
                "src/loader.js",
                "var quotes = /['\"]/g;\ndefine({ pluginBuilder: './loaderBuilder', load: function () {} });",
            ),
            (
                "src/loaderBuilder.js",
                "define([], function () { return { load: function () {} }; });",
            ),
        ],
        ScanEvaluator::new(),
    );

    session.require(&["main"]).unwrap();

    assert_eq!(session.plugins().builder_of("loader"), Some("loaderBuilder"));
    assert_eq!(fs.read_count("src/loaderBuilder.js"), 1);
    assert_eq!(
        session.layer().build_file_paths(),
        ["src/loader.js", "loader!a", "src/main.js"]
    );
}
