use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use nbeats_ensemble::data::{CsvDatasetLoader, WindowLoaderFactory};
use nbeats_ensemble::grid::{describe_groups, FrequencyGroup, GroupSpec, DEFAULT_LOOKBACKS};
use nbeats_ensemble::ml::{SeasonalNaiveFactory, SeasonalNaiveTrainer};
use nbeats_ensemble::orchestrator::{write_outputs, EnsembleOrchestrator, FailurePolicy};
use nbeats_ensemble::system::{MemoryGuard, SystemMonitor};
use nbeats_ensemble::Config;

const TABLE_WIDTH: usize = 60;

pub struct FitArgs {
    pub groups: Vec<String>,
    pub data_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub policy: Option<String>,
    pub val_freq_steps: Option<usize>,
    pub lookbacks: Vec<usize>,
}

/// Build the M4 group specs for the requested names, all groups when none are given
pub fn resolve_groups(names: &[String], lookbacks: &[usize]) -> Result<Vec<GroupSpec>> {
    let lookbacks = if lookbacks.is_empty() {
        &DEFAULT_LOOKBACKS[..]
    } else {
        lookbacks
    };

    let groups = if names.is_empty() {
        vec![
            FrequencyGroup::yearly(),
            FrequencyGroup::quarterly(),
            FrequencyGroup::monthly(),
        ]
    } else {
        names
            .iter()
            .map(|name| {
                FrequencyGroup::from_name(name)
                    .ok_or_else(|| anyhow!("Unknown frequency group '{}' (use Yearly, Quarterly or Monthly)", name))
            })
            .collect::<Result<Vec<_>>>()?
    };

    Ok(groups
        .into_iter()
        .map(|group| GroupSpec::m4(group, lookbacks))
        .collect())
}

/// Train the ensembles and write forecasts plus the run summary
pub fn fit(mut config: Config, args: FitArgs) -> Result<()> {
    if let Some(dir) = args.data_dir {
        config.data.data_dir = dir;
    }
    if let Some(dir) = args.output {
        config.data.output_dir = dir;
    }
    if let Some(policy) = args.policy {
        config.training.failure_policy = policy
            .parse::<FailurePolicy>()
            .map_err(|e| anyhow!(e))
            .context("Invalid --policy value")?;
    }
    if let Some(steps) = args.val_freq_steps {
        config.training.val_freq_steps = steps;
    }

    let specs = resolve_groups(&args.groups, &args.lookbacks)?;
    info!(
        data_dir = %config.data.data_dir.display(),
        groups = specs.len(),
        policy = %config.training.failure_policy,
        "🔍 Starting ensemble fit"
    );
    print!("{}", describe_groups(&specs, TABLE_WIDTH));

    let mut orchestrator = EnsembleOrchestrator::new(
        CsvDatasetLoader::new(&config.data.data_dir),
        WindowLoaderFactory::new(),
        SeasonalNaiveFactory,
        SeasonalNaiveTrainer,
        config.orchestrator_options(),
    );
    if config.resources.min_free_memory_gb > 0.0 {
        orchestrator = orchestrator.with_guard(Box::new(MemoryGuard::new(config.resources.min_free_memory_gb)));
    }

    let report = orchestrator.fit(&specs);

    let mut monitor = SystemMonitor::new();
    if let Err(e) = monitor.log_memory_stats() {
        warn!("Failed to collect system stats: {}", e);
    }

    report.display_summary();

    let written = write_outputs(&report, &config.data.output_dir)
        .with_context(|| format!("Failed to write outputs to {}", config.data.output_dir.display()))?;
    for path in &written {
        println!("📄 {}", path.display());
    }

    if report.succeeded() == 0 {
        bail!("No frequency group completed ({} failed)", report.failed());
    }

    println!("\n✅ Ensemble fit completed");
    Ok(())
}

/// Print the combined grid of each group
pub fn grid(names: &[String], lookbacks: &[usize]) -> Result<()> {
    let specs = resolve_groups(names, lookbacks)?;
    print!("{}", describe_groups(&specs, TABLE_WIDTH));
    Ok(())
}
