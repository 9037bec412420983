use std::{
    io::{self, Write},
    path::PathBuf,
};

use amdbuild::{
    amd_scan::{AmdScanner, ScanEvaluator, wrap_commonjs},
    collaborators::ReadHooks,
    config::BuildConfig,
    host::DiskFileSystem,
    session::{BuildSession, Collaborators},
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info};

/// Resolve AMD build layers and print the files of each in output order
#[derive(Parser, Debug)]
#[command(name = "amdbuild", version, about)]
struct Cli {
    /// Build configuration file
    #[arg(short, long, default_value = "amdbuild.toml")]
    config: PathBuf,

    /// Only build the layer with this name
    #[arg(short, long)]
    layer: Option<String>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = BuildConfig::from_file(&cli.config)?;
    let layers: Vec<_> = config
        .layers
        .iter()
        .filter(|layer| cli.layer.as_deref().is_none_or(|name| name == layer.name))
        .cloned()
        .collect();
    if layers.is_empty() {
        bail!("No layers to build in {}", cli.config.display());
    }

    let mut hooks = ReadHooks::default();
    if config.cjs_translate {
        hooks = hooks.with_translate(wrap_commonjs);
    }
    let io = Collaborators::new(DiskFileSystem, AmdScanner, ScanEvaluator::new()).with_hooks(hooks);
    let mut session = BuildSession::new(config, io);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for layer in &layers {
        session.reset_layer();
        session
            .require(layer.include.as_slice())
            .with_context(|| format!("Failed to build layer {}", layer.name))?;

        let state = session.layer();
        info!(
            "Layer {} resolved {} files",
            layer.name,
            state.build_file_paths().len()
        );
        writeln!(out, "{}:", layer.name)?;
        for path in state.build_file_paths() {
            writeln!(out, "  {path}")?;
        }
        if let Some(url) = state.existing_require_url() {
            writeln!(out, "  (module loader already present in {url})")?;
        }
    }

    Ok(())
}
