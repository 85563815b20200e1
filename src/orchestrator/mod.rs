//! Orchestrator module for ensemble training runs
//! Plans the members of each frequency group, trains them and aggregates their forecasts

pub mod aggregate;
pub mod ensemble;
pub mod forecast;
pub mod report;

// Re-export main orchestrator
pub use aggregate::{aggregate, aggregate_median, EnsembleCombiner, EnsembleResult, MedianCombiner};
pub use ensemble::{ArchitecturePlan, EnsembleOrchestrator, EnsemblePlan, FailurePolicy, MemberPlan, OrchestratorOptions};
pub use forecast::{model_label, ForecastTable, SeriesForecast};
pub use report::{write_outputs, FitReport, GroupFit, GroupOutcome, GroupStatus, GroupSummary, MemberFailure, RunSummary};
