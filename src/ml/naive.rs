//! Seasonal naive baseline collaborators
//!
//! Lets the full orchestration run without an external neural backend: the
//! "model" repeats the last seasonal cycle of each input window, and the
//! trainer walks the configured step budget tracking masked absolute error.

use tracing::debug;

use super::{ModelConfig, ModelFactory, PredictionBatch, Trainer, TrainingSummary};
use crate::data::{Window, WindowLoader};
use crate::errors::{EnsembleError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalNaiveModel {
    pub n_time_in: usize,
    pub n_time_out: usize,
    pub seasonality: usize,
    pub steps_trained: usize,
}

impl SeasonalNaiveModel {
    /// Forecast `n_time_out` values from one window's observed input
    pub fn forecast(&self, window: &Window) -> Result<Vec<f64>> {
        let history = window.observed_insample();
        if history.is_empty() {
            return Err(EnsembleError::training(
                0,
                format!("window of series {} has no observed input", window.series_id),
            ));
        }

        let period = self.seasonality.clamp(1, history.len());
        let start = history.len() - period;
        Ok((0..self.n_time_out)
            .map(|h| history[start + h % period])
            .collect())
    }

    fn masked_error(&self, windows: &[&Window]) -> Result<Option<f64>> {
        let mut total = 0.0;
        let mut count = 0usize;
        for window in windows {
            let forecast = self.forecast(window)?;
            for ((actual, predicted), mask) in window.outsample.iter().zip(&forecast).zip(&window.outsample_mask) {
                if *mask > 0.0 {
                    total += (actual - predicted).abs();
                    count += 1;
                }
            }
        }
        Ok((count > 0).then(|| total / count as f64))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeasonalNaiveFactory;

impl ModelFactory for SeasonalNaiveFactory {
    type Model = SeasonalNaiveModel;

    fn instantiate(&self, config: &ModelConfig) -> Result<SeasonalNaiveModel> {
        config.validate()?;
        Ok(SeasonalNaiveModel {
            n_time_in: config.n_time_in,
            n_time_out: config.n_time_out,
            seasonality: config.seasonality,
            steps_trained: 0,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeasonalNaiveTrainer;

impl Trainer<SeasonalNaiveModel> for SeasonalNaiveTrainer {
    fn fit(
        &self,
        model: &mut SeasonalNaiveModel,
        train_loader: &WindowLoader,
        val_loader: &WindowLoader,
        steps: usize,
        validation_interval: usize,
    ) -> Result<TrainingSummary> {
        if train_loader.is_empty() {
            return Err(EnsembleError::training(0, "train loader produced no windows"));
        }

        let mut summary = TrainingSummary::default();
        let mut epoch = 0u64;

        while summary.steps < steps {
            for batch in train_loader.batches(epoch) {
                if summary.steps >= steps {
                    break;
                }
                if let Some(window) = batch.iter().find(|w| w.insample.len() != model.n_time_in) {
                    return Err(EnsembleError::training(
                        0,
                        format!(
                            "window of series {} has {} inputs, model expects {}",
                            window.series_id,
                            window.insample.len(),
                            model.n_time_in
                        ),
                    ));
                }

                summary.final_train_loss = model.masked_error(&batch)?;
                summary.steps += 1;

                if validation_interval > 0 && summary.steps % validation_interval == 0 {
                    let windows: Vec<&Window> = val_loader.windows().iter().collect();
                    summary.final_val_loss = model.masked_error(&windows)?;
                    summary.validations += 1;
                }
            }
            epoch += 1;
        }

        model.steps_trained = summary.steps;
        debug!(
            steps = summary.steps,
            validations = summary.validations,
            train_mae = ?summary.final_train_loss,
            "Seasonal naive training finished"
        );
        Ok(summary)
    }

    fn predict(&self, model: &SeasonalNaiveModel, loader: &WindowLoader) -> Result<Vec<PredictionBatch>> {
        loader
            .batches(0)
            .into_iter()
            .enumerate()
            .map(|(index, batch)| {
                let values = batch
                    .iter()
                    .map(|window| model.forecast(window))
                    .collect::<Result<Vec<_>>>()?;
                Ok(PredictionBatch { index, values })
            })
            .collect()
    }
}
