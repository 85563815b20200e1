use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::Cli;
use nbeats_ensemble::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with structured JSON logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "nbeats-ensemble starting up");

    let config = Config::load_from(cli.config.as_deref())?;
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    cli::run(cli, config)?;

    info!("nbeats-ensemble completed successfully");
    Ok(())
}
