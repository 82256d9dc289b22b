mod api;
mod cli;
mod config;
mod maintenance;

use anyhow::{Context, Result};
use clap::Parser; // needed for Cli::parse()
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use cli::commands::run_cli;
use cli::opts::Cli;
use config::{AppConfig, LogFormat};

fn main() -> Result<()> {
    let args = Cli::parse();
    let cfg = config::load_config(args.config.as_deref(), args.profile)
        .context("Failed to load configuration")?;
    init_tracing(&cfg);

    tracing::debug!(
        profile = ?cfg.profile,
        data_file = %cfg.store.data_file.display(),
        "configuration loaded"
    );

    let rt = Runtime::new()?;
    rt.block_on(run_cli(args, cfg))
}

/// `RUST_LOG` takes precedence over the configured level. Logs go to stderr
/// so command output on stdout stays clean.
fn init_tracing(cfg: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match cfg.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}
