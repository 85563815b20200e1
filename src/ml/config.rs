//! Typed model configuration resolved from a merged hyperparameter row

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{EnsembleError, Result};
use crate::grid::HyperparameterRow;

/// Loss functions accepted for training and validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LossFunction {
    Mape,
    Smape,
    Mase,
    Mae,
    Mse,
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossFunction::Mape => write!(f, "MAPE"),
            LossFunction::Smape => write!(f, "SMAPE"),
            LossFunction::Mase => write!(f, "MASE"),
            LossFunction::Mae => write!(f, "MAE"),
            LossFunction::Mse => write!(f, "MSE"),
        }
    }
}

impl FromStr for LossFunction {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MAPE" => Ok(LossFunction::Mape),
            "SMAPE" => Ok(LossFunction::Smape),
            "MASE" => Ok(LossFunction::Mase),
            "MAE" => Ok(LossFunction::Mae),
            "MSE" => Ok(LossFunction::Mse),
            other => Err(EnsembleError::InvalidConfig(format!("unknown loss function '{}'", other))),
        }
    }
}

/// Fully resolved configuration handed to the model factory.
///
/// Keys outside this struct are rejected. Other missing keys fall back to
/// [`Default`], except the [`REQUIRED_PARAMETERS`] which every row must set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    // Architecture
    pub n_time_in: usize,
    pub n_time_out: usize,
    pub n_x: usize,
    pub n_s: usize,
    pub n_x_hidden: usize,
    pub n_s_hidden: usize,
    pub shared_weights: bool,
    pub initialization: String,
    pub activation: String,
    pub stack_types: Vec<String>,
    pub n_blocks: Vec<usize>,
    pub n_layers: Vec<usize>,
    pub n_theta_hidden: Vec<Vec<usize>>,
    pub n_harmonics: usize,
    pub n_polynomials: usize,
    pub batch_normalization: bool,
    pub dropout_prob_theta: f64,

    // Optimization
    pub learning_rate: f64,
    pub lr_decay: f64,
    pub lr_decay_step_size: usize,
    pub weight_decay: f64,
    pub loss_train: LossFunction,
    pub loss_val: LossFunction,
    pub n_steps: usize,
    pub batch_size: usize,
    pub random_seed: u64,

    // Data
    pub frequency: String,
    pub seasonality: usize,
    pub train_sample_freq: usize,
    pub complete_inputs: bool,
    pub mode: String,
    pub l_h: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_time_in: 0,
            n_time_out: 0,
            n_x: 0,
            n_s: 0,
            n_x_hidden: 0,
            n_s_hidden: 0,
            shared_weights: false,
            initialization: "lecun_normal".to_string(),
            activation: "ReLU".to_string(),
            stack_types: vec!["trend".to_string(), "seasonality".to_string()],
            n_blocks: vec![3, 3],
            n_layers: vec![4, 4],
            n_theta_hidden: vec![vec![256; 4], vec![2048; 4]],
            n_harmonics: 1,
            n_polynomials: 2,
            batch_normalization: false,
            dropout_prob_theta: 0.0,
            learning_rate: 0.001,
            lr_decay: 0.0,
            lr_decay_step_size: 1_000,
            weight_decay: 0.0,
            loss_train: LossFunction::Mae,
            loss_val: LossFunction::Smape,
            n_steps: 0,
            batch_size: 0,
            random_seed: 0,
            frequency: "D".to_string(),
            seasonality: 1,
            train_sample_freq: 1,
            complete_inputs: false,
            mode: "simple".to_string(),
            l_h: 1.5,
        }
    }
}

/// Parameters with no meaningful default
pub const REQUIRED_PARAMETERS: [&str; 5] = ["n_time_in", "n_time_out", "loss_train", "n_steps", "batch_size"];

impl ModelConfig {
    /// Resolve and validate a merged architecture + ensemble row
    pub fn from_row(row: &HyperparameterRow) -> Result<Self> {
        if let Some(missing) = REQUIRED_PARAMETERS.iter().find(|name| row.get(name).is_none()) {
            return Err(EnsembleError::InvalidConfig(format!(
                "missing required parameter '{}' (row: {})",
                missing, row
            )));
        }
        let config: ModelConfig = serde_json::from_value(row.to_json())
            .map_err(|e| EnsembleError::InvalidConfig(format!("{} (row: {})", e, row)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("n_time_in", self.n_time_in),
            ("n_time_out", self.n_time_out),
            ("n_steps", self.n_steps),
            ("batch_size", self.batch_size),
            ("train_sample_freq", self.train_sample_freq),
            ("seasonality", self.seasonality),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(EnsembleError::InvalidConfig(format!(
                    "{} must be a positive integer",
                    name
                )));
            }
        }

        let n_stacks = self.stack_types.len();
        if n_stacks == 0 {
            return Err(EnsembleError::InvalidConfig(
                "stack_types must name at least one stack".to_string(),
            ));
        }
        if self.n_blocks.len() != n_stacks
            || self.n_layers.len() != n_stacks
            || self.n_theta_hidden.len() != n_stacks
        {
            return Err(EnsembleError::InvalidConfig(format!(
                "n_blocks, n_layers and n_theta_hidden must have one entry per stack ({})",
                n_stacks
            )));
        }
        for (stack, (layers, hidden)) in self.n_layers.iter().zip(&self.n_theta_hidden).enumerate() {
            if hidden.len() != *layers {
                return Err(EnsembleError::InvalidConfig(format!(
                    "stack {} has {} layers but {} hidden sizes",
                    stack,
                    layers,
                    hidden.len()
                )));
            }
        }

        if !(0.0..1.0).contains(&self.dropout_prob_theta) {
            return Err(EnsembleError::InvalidConfig(format!(
                "dropout_prob_theta must be in [0, 1), got {}",
                self.dropout_prob_theta
            )));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(EnsembleError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }

        Ok(())
    }

    /// Input window length as a multiple of the horizon
    pub fn lookback_multiple(&self, horizon: usize) -> usize {
        if horizon == 0 {
            return 0;
        }
        self.n_time_in / horizon
    }

    /// Label identifying an ensemble member in logs and outputs
    pub fn version_label(&self, horizon: usize) -> String {
        format!(
            "loss-{}_lbl-{}__rs-{}",
            self.loss_train,
            self.lookback_multiple(horizon),
            self.random_seed
        )
    }
}
