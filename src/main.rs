//! APK Shell command-line entry point.

use anyhow::Result;
use apkshell::cli::Cli;
use apkshell::commands;
use apkshell_core::{APP_NAME, VERSION};
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("{} v{} starting...", APP_NAME, VERSION);

    if let Err(e) = commands::run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
