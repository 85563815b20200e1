use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use nbeats_ensemble::Config;

pub mod commands;

#[derive(Parser)]
#[command(
    name = "nbeats-ensemble",
    about = "NBEATS ensemble training over M4 frequency groups",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Alternate .env file to load configuration from
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train every ensemble member of the selected groups and write the aggregated forecasts
    Fit {
        /// Frequency groups to fit (defaults to Yearly,Quarterly,Monthly)
        #[arg(short, long, value_delimiter = ',')]
        groups: Vec<String>,

        /// Dataset root (overrides NBEATS_DATA_DIR)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Output directory (overrides NBEATS_OUTPUT_DIR)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Failure policy: abort-group or skip-member
        #[arg(short, long)]
        policy: Option<String>,

        /// Validation interval in training steps
        #[arg(long)]
        val_freq_steps: Option<usize>,

        /// Input window lengths as multiples of the horizon
        #[arg(short, long, value_delimiter = ',')]
        lookbacks: Vec<usize>,
    },

    /// Print each group's combined grid and its number of model configurations
    Grid {
        /// Frequency groups to list (defaults to all)
        #[arg(short, long, value_delimiter = ',')]
        groups: Vec<String>,

        /// Input window lengths as multiples of the horizon
        #[arg(short, long, value_delimiter = ',')]
        lookbacks: Vec<usize>,
    },
}

/// Execute CLI command with loaded configuration
pub fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Fit {
            groups,
            data_dir,
            output,
            policy,
            val_freq_steps,
            lookbacks,
        } => {
            info!("Running ensemble fit");
            let args = commands::FitArgs {
                groups,
                data_dir,
                output,
                policy,
                val_freq_steps,
                lookbacks,
            };
            commands::fit(config, args)?;
        }
        Commands::Grid { groups, lookbacks } => {
            info!("Listing hyperparameter grids");
            commands::grid(&groups, &lookbacks)?;
        }
    }
    Ok(())
}
