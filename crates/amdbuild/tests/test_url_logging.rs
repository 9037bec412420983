use std::sync::Mutex;

use amdbuild::{
    amd_scan::{AmdScanner, ScanEvaluator},
    config::BuildConfig,
    host::MemoryFileSystem,
    session::{BuildSession, Collaborators},
};
use log::{Level, LevelFilter, Log, Metadata, Record};
use pretty_assertions::assert_eq;

/// Keeps every `info!` record emitted by the crate
struct CapturingLogger {
    messages: Mutex<Vec<String>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Info && metadata.target().starts_with("amdbuild")
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            self.messages.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    messages: Mutex::new(Vec::new()),
};

fn skipped_urls() -> Vec<String> {
    LOGGER
        .messages
        .lock()
        .unwrap()
        .iter()
        .filter_map(|message| message.strip_prefix("Cannot optimize network URL, skipping: "))
        .map(str::to_owned)
        .collect()
}

#[test]
fn test_unsupported_urls_are_logged_once_per_layer() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Info);

    let mut config = BuildConfig {
        base_url: "src/".to_owned(),
        ..BuildConfig::default()
    };
    config.paths.insert("jquery".to_owned(), "empty:".to_owned());
    config.paths.insert("underscore".to_owned(), "empty:".to_owned());
    let fs = MemoryFileSystem::new()
        .with_file(
            "src/main.js",
            "define(['jquery', 'underscore', 'http://cdn.example.com/lib.js'], function () {});",
        )
        .with_file(
            "src/other.js",
            "define(['jquery', 'http://cdn.example.com/lib.js'], function () {});",
        );
    let io = Collaborators::new(fs, AmdScanner, ScanEvaluator::new());
    let mut session = BuildSession::new(config, io);

    session.require(&["main", "other"]).unwrap();
    assert!(!session.is_supported_url("empty:"));
    assert!(session.is_supported_url("src/main.js"));
    assert_eq!(skipped_urls(), ["empty:", "http://cdn.example.com/lib.js"]);

    session.reset_layer();
    session.require(&["other"]).unwrap();
    assert_eq!(
        skipped_urls(),
        [
            "empty:",
            "http://cdn.example.com/lib.js",
            "empty:",
            "http://cdn.example.com/lib.js"
        ]
    );
}
