//! Model construction and training contracts
//! The NBEATS network and its optimizer live behind these traits

pub mod config;
pub mod naive;

pub use config::{LossFunction, ModelConfig};
pub use naive::{SeasonalNaiveFactory, SeasonalNaiveModel, SeasonalNaiveTrainer};

use serde::{Deserialize, Serialize};

use crate::data::WindowLoader;
use crate::errors::Result;

/// Instantiates a trainable model from a resolved configuration
pub trait ModelFactory {
    type Model;

    fn instantiate(&self, config: &ModelConfig) -> Result<Self::Model>;
}

/// Runs optimization and inference for models of type `M`
pub trait Trainer<M> {
    /// Train for `steps` optimization steps, validating every `validation_interval` steps
    fn fit(
        &self,
        model: &mut M,
        train_loader: &WindowLoader,
        val_loader: &WindowLoader,
        steps: usize,
        validation_interval: usize,
    ) -> Result<TrainingSummary>;

    /// Forecast every window of `loader`, batch by batch, in loader order
    fn predict(&self, model: &M, loader: &WindowLoader) -> Result<Vec<PredictionBatch>>;
}

/// Predictions for one batch: one row of `n_time_out` values per window
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionBatch {
    pub index: usize,
    pub values: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub steps: usize,
    pub validations: usize,
    pub final_train_loss: Option<f64>,
    pub final_val_loss: Option<f64>,
}
