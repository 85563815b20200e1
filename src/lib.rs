// nbeats-ensemble - NBEATS ensemble orchestration for M4 frequency groups
// Expands hyperparameter grids, trains one model per configuration and
// aggregates member forecasts with a per-series median.

#![deny(clippy::unwrap_used)]

pub mod config;
pub mod data;
pub mod errors;
pub mod grid;
pub mod ml;
pub mod orchestrator;
pub mod system;

// Re-export commonly used items
pub use config::Config;
pub use errors::{EnsembleError, Result};
pub use grid::{expand, FrequencyGroup, GroupSpec, HyperparameterGrid, HyperparameterRow};
pub use orchestrator::{EnsembleOrchestrator, EnsembleResult, FailurePolicy, FitReport, OrchestratorOptions};
