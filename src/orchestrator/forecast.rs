//! Per-member forecast tables

use serde::{Deserialize, Serialize};

use crate::data::WindowLoader;
use crate::errors::{EnsembleError, Result};
use crate::ml::PredictionBatch;

/// Forecast of one series: one value per future time step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesForecast {
    pub unique_id: String,
    pub values: Vec<f64>,
}

/// Predictions of a single ensemble member, tagged with its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastTable {
    /// `m_{model_index}`
    pub model: String,
    pub model_index: usize,
    pub version: String,
    pub rows: Vec<SeriesForecast>,
}

pub fn model_label(model_index: usize) -> String {
    format!("m_{}", model_index)
}

impl ForecastTable {
    /// Stack prediction batches in order and attach the series identifiers of the loader windows
    pub fn from_predictions(
        model_index: usize,
        version: &str,
        batches: Vec<PredictionBatch>,
        loader: &WindowLoader,
    ) -> Result<Self> {
        let series_ids = loader.series_ids();
        let predictions: Vec<Vec<f64>> = batches.into_iter().flat_map(|batch| batch.values).collect();

        if predictions.len() != series_ids.len() {
            return Err(EnsembleError::training(
                model_index,
                format!(
                    "predicted {} rows for {} evaluation windows",
                    predictions.len(),
                    series_ids.len()
                ),
            ));
        }
        if let Some(row) = predictions.iter().position(|values| values.iter().any(|v| !v.is_finite())) {
            return Err(EnsembleError::training(
                model_index,
                format!("non-finite forecast for series {}", series_ids[row]),
            ));
        }

        let rows = series_ids
            .into_iter()
            .zip(predictions)
            .map(|(unique_id, values)| SeriesForecast {
                unique_id: unique_id.to_string(),
                values,
            })
            .collect();

        Ok(Self {
            model: model_label(model_index),
            model_index,
            version: version.to_string(),
            rows,
        })
    }

    pub fn horizon(&self) -> usize {
        self.rows.first().map(|row| row.values.len()).unwrap_or(0)
    }

    pub fn get(&self, unique_id: &str) -> Option<&[f64]> {
        self.rows
            .iter()
            .find(|row| row.unique_id == unique_id)
            .map(|row| row.values.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Window;

    fn loader(ids: &[&str]) -> WindowLoader {
        let windows = ids
            .iter()
            .map(|id| Window {
                series_id: id.to_string(),
                insample: vec![1.0],
                insample_mask: vec![1.0],
                outsample: vec![0.0, 0.0],
                outsample_mask: vec![1.0, 1.0],
                static_features: vec![],
            })
            .collect();
        WindowLoader::new(windows, 2, false, 0)
    }

    #[test]
    fn test_batches_are_stacked_in_order() {
        let batches = vec![
            PredictionBatch {
                index: 0,
                values: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            },
            PredictionBatch {
                index: 1,
                values: vec![vec![5.0, 6.0]],
            },
        ];

        let table = ForecastTable::from_predictions(3, "loss-MAPE_lbl-2__rs-0", batches, &loader(&["a", "b", "c"])).unwrap();
        assert_eq!(table.model, "m_3");
        assert_eq!(table.horizon(), 2);
        assert_eq!(table.get("c"), Some(&[5.0, 6.0][..]));
        assert_eq!(table.rows[0].unique_id, "a");
    }

    #[test]
    fn test_row_count_mismatch_is_training_failure() {
        let batches = vec![PredictionBatch {
            index: 0,
            values: vec![vec![1.0, 2.0]],
        }];
        let err = ForecastTable::from_predictions(2, "v", batches, &loader(&["a", "b"])).unwrap_err();
        assert!(matches!(err, EnsembleError::TrainingFailure { model_index: 2, .. }));
    }

    #[test]
    fn test_non_finite_forecast_is_rejected() {
        let batches = vec![PredictionBatch {
            index: 0,
            values: vec![vec![1.0, f64::NAN]],
        }];
        assert!(ForecastTable::from_predictions(1, "v", batches, &loader(&["a"])).is_err());
    }
}
