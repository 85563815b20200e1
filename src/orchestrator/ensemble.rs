//! Ensemble orchestrator
//! Expands each group's grids, trains one model per combined row and aggregates their forecasts

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::aggregate::aggregate_median;
use super::forecast::{model_label, ForecastTable};
use super::report::{FitReport, GroupFit, GroupOutcome, MemberFailure};
use crate::data::{split_masks, Dataset, DatasetLoader, LoaderFactory, WindowLoader, WindowSpec};
use crate::errors::{EnsembleError, Result};
use crate::grid::{expand, FrequencyGroup, GroupSpec, HyperparameterRow};
use crate::ml::{ModelConfig, ModelFactory, Trainer};
use crate::system::ResourceGuard;

/// What happens to a group when one of its members fails to train or predict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the group; other groups still run
    #[default]
    AbortGroup,
    /// Leave the member out of the aggregation and continue
    SkipMember,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::AbortGroup => write!(f, "abort-group"),
            FailurePolicy::SkipMember => write!(f, "skip-member"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "abort-group" | "abort" => Ok(FailurePolicy::AbortGroup),
            "skip-member" | "skip" => Ok(FailurePolicy::SkipMember),
            other => Err(format!(
                "unknown failure policy '{}' (use abort-group or skip-member)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorOptions {
    /// Validate every this many training steps
    pub val_freq_steps: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            val_freq_steps: 100,
            failure_policy: FailurePolicy::AbortGroup,
        }
    }
}

/// One ensemble member: a resolved configuration and its label
#[derive(Debug, Clone)]
pub struct MemberPlan {
    pub model_index: usize,
    pub hyperparameters: HyperparameterRow,
    pub config: ModelConfig,
    pub version: String,
}

/// One architecture row and the members derived from it
#[derive(Debug, Clone)]
pub struct ArchitecturePlan {
    pub row: HyperparameterRow,
    pub members: Vec<MemberPlan>,
}

/// Every model a group will train, resolved and validated up front
#[derive(Debug, Clone)]
pub struct EnsemblePlan {
    pub group: FrequencyGroup,
    pub architectures: Vec<ArchitecturePlan>,
}

impl EnsemblePlan {
    /// Expand both grids and resolve every merged row into a [`ModelConfig`].
    /// Grid and configuration errors surface here, before any data is loaded or model built.
    pub fn build(spec: &GroupSpec) -> Result<Self> {
        let architecture_rows = expand(&spec.architecture_grid)?;
        let mut model_index = 0;
        let mut architectures = Vec::with_capacity(architecture_rows.len());

        for row in architecture_rows {
            let ensemble_rows = expand(&spec.ensemble_grid)?;
            let mut members = Vec::with_capacity(ensemble_rows.len());

            for ensemble_row in &ensemble_rows {
                model_index += 1;
                let hyperparameters = row.merge(ensemble_row);
                let config = ModelConfig::from_row(&hyperparameters)?;
                let version = config.version_label(spec.group.horizon);
                members.push(MemberPlan {
                    model_index,
                    hyperparameters,
                    config,
                    version,
                });
            }

            architectures.push(ArchitecturePlan { row, members });
        }

        Ok(Self {
            group: spec.group.clone(),
            architectures,
        })
    }

    pub fn total_models(&self) -> usize {
        self.architectures.iter().map(|a| a.members.len()).sum()
    }

    pub fn members(&self) -> impl Iterator<Item = &MemberPlan> {
        self.architectures.iter().flat_map(|a| a.members.iter())
    }
}

/// Loader-relevant part of a configuration; loaders are shared while it stays the same
#[derive(Debug, Clone, PartialEq)]
struct LoaderSettings {
    n_time_in: usize,
    n_time_out: usize,
    train_sample_freq: usize,
    complete_inputs: bool,
    batch_size: usize,
}

impl From<&ModelConfig> for LoaderSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            n_time_in: config.n_time_in,
            n_time_out: config.n_time_out,
            train_sample_freq: config.train_sample_freq,
            complete_inputs: config.complete_inputs,
            batch_size: config.batch_size,
        }
    }
}

struct SharedLoaders {
    settings: LoaderSettings,
    train: WindowLoader,
    eval: WindowLoader,
}

/// Trains the full grid of models per frequency group and aggregates their forecasts
pub struct EnsembleOrchestrator<D, L, F, T> {
    datasets: D,
    loaders: L,
    factory: F,
    trainer: T,
    options: OrchestratorOptions,
    guard: Option<Box<dyn ResourceGuard>>,
}

impl<D, L, F, T> EnsembleOrchestrator<D, L, F, T>
where
    D: DatasetLoader,
    L: LoaderFactory,
    F: ModelFactory,
    T: Trainer<F::Model>,
{
    pub fn new(datasets: D, loaders: L, factory: F, trainer: T, options: OrchestratorOptions) -> Self {
        Self {
            datasets,
            loaders,
            factory,
            trainer,
            options,
            guard: None,
        }
    }

    /// Consult `guard` before every model instantiation
    pub fn with_guard(mut self, guard: Box<dyn ResourceGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Fit every group in order. A failing group is recorded and does not stop the others.
    pub fn fit(&self, specs: &[GroupSpec]) -> FitReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, groups = specs.len(), policy = %self.options.failure_policy, "Starting ensemble run");

        let mut groups = Vec::with_capacity(specs.len());
        for spec in specs {
            let result = self.fit_group(spec);
            match &result {
                Ok(fit) => info!(
                    group = %spec.group.name,
                    trained = fit.members.len(),
                    skipped = fit.failures.len(),
                    series = fit.ensemble.rows.len(),
                    "✅ Group ensemble complete"
                ),
                Err(e) => error!(group = %spec.group.name, kind = e.kind(), "Group failed: {}", e),
            }
            groups.push(GroupOutcome {
                group: spec.group.name.clone(),
                result,
            });
        }

        FitReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            groups,
        }
    }

    /// Train and aggregate the ensemble of one group
    pub fn fit_group(&self, spec: &GroupSpec) -> Result<GroupFit> {
        let plan = EnsemblePlan::build(spec)?;
        let total = plan.total_models();
        let group = &plan.group.name;
        info!(
            group = %group,
            architectures = plan.architectures.len(),
            models = total,
            "🚀 Planned ensemble"
        );

        let dataset = self.datasets.load(group)?;

        let mut members = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for architecture in &plan.architectures {
            debug!(group = %group, row = %architecture.row, "Architecture row");
            let mut shared: Option<SharedLoaders> = None;

            for member in &architecture.members {
                let settings = LoaderSettings::from(&member.config);
                let current = match shared.take() {
                    Some(loaders) if loaders.settings == settings => loaders,
                    _ => self.build_loaders(group, &dataset, settings)?,
                };

                report_progress(&plan.group, member, total);

                let outcome = self
                    .train_member(member, &current.train, &current.eval)
                    .map_err(|e| e.into_training_failure(member.model_index));
                shared = Some(current);

                match outcome {
                    Ok(table) => {
                        debug!(group = %group, model = %table.model, series = table.rows.len(), "Member forecast collected");
                        members.push(table);
                    }
                    Err(err) => match self.options.failure_policy {
                        FailurePolicy::AbortGroup => {
                            error!(group = %group, model = member.model_index, "Aborting group: {}", err);
                            return Err(err);
                        }
                        FailurePolicy::SkipMember => {
                            warn!(group = %group, model = member.model_index, "Skipping ensemble member: {}", err);
                            failures.push(MemberFailure {
                                model: model_label(member.model_index),
                                version: member.version.clone(),
                                reason: err.to_string(),
                            });
                        }
                    },
                }
            }
        }

        if members.is_empty() && !failures.is_empty() {
            return Err(EnsembleError::aggregation(
                group.as_str(),
                format!("all {} ensemble members failed", failures.len()),
            ));
        }

        let ensemble = aggregate_median(group, &members)?;

        Ok(GroupFit {
            group: plan.group.clone(),
            planned_models: total,
            ensemble,
            members,
            failures,
        })
    }

    /// Train loader over the train region, evaluation loader with the last window of every series
    fn build_loaders(&self, group: &str, dataset: &Dataset, settings: LoaderSettings) -> Result<SharedLoaders> {
        info!(group, n_time_in = settings.n_time_in, "Instantiating loaders");

        let (train_mask, valid_mask, _) = split_masks(&dataset.series, 0, settings.n_time_out);
        let train_spec = WindowSpec {
            input_size: settings.n_time_in,
            output_size: settings.n_time_out,
            sample_freq: settings.train_sample_freq,
            complete_windows: settings.complete_inputs,
            last_window: false,
            batch_size: settings.batch_size,
            shuffle: true,
            seed: 0,
        };
        let eval_spec = WindowSpec {
            last_window: true,
            shuffle: false,
            ..train_spec.clone()
        };

        let train = self
            .loaders
            .build(&dataset.series, dataset.statics.as_ref(), &train_mask, &train_spec)?;
        let eval = self
            .loaders
            .build(&dataset.series, dataset.statics.as_ref(), &valid_mask, &eval_spec)?;

        debug!(group, train_windows = train.len(), eval_windows = eval.len(), "Data loaders ready");
        Ok(SharedLoaders { settings, train, eval })
    }

    /// Model, predictions and forecast of one member; all of it is dropped on return
    fn train_member(&self, member: &MemberPlan, train: &WindowLoader, eval: &WindowLoader) -> Result<ForecastTable> {
        if let Some(guard) = &self.guard {
            guard
                .check_before_model(&model_label(member.model_index))
                .map_err(|e| EnsembleError::training(member.model_index, e.to_string()))?;
        }

        let mut model = self.factory.instantiate(&member.config)?;

        // validation runs on the training windows; the evaluation windows are the forecast target
        let summary = self.trainer.fit(
            &mut model,
            train,
            train,
            member.config.n_steps,
            self.options.val_freq_steps,
        )?;
        debug!(
            model = member.model_index,
            steps = summary.steps,
            validations = summary.validations,
            "Training finished"
        );

        let batches = self.trainer.predict(&model, eval)?;
        ForecastTable::from_predictions(member.model_index, &member.version, batches, eval)
    }
}

/// Announce a member before it trains: group, position in the ensemble and active hyperparameters
fn report_progress(group: &FrequencyGroup, member: &MemberPlan, total: usize) {
    let config = &member.config;
    let lookback = config.lookback_multiple(group.horizon);

    info!(
        group = %group.name,
        model = member.model_index,
        total,
        loss = %config.loss_train,
        lookback,
        random_seed = config.random_seed,
        version = %member.version,
        "Training ensemble member"
    );
    println!(
        "\n{} ({}/{}) - loss: {}, lookback length: {}, random_seed: {}",
        group.name, member.model_index, total, config.loss_train, lookback, config.random_seed
    );
}
