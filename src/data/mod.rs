//! Dataset tables, train/validation masks and window loaders
//! The orchestrator only depends on the traits defined here; file formats live in `loader`

pub mod loader;
pub mod mask;
pub mod windows;

pub use loader::CsvDatasetLoader;
pub use mask::{split_masks, SeriesMask};
pub use windows::{LoaderFactory, Window, WindowLoader, WindowLoaderFactory, WindowSpec};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::Result;

/// One target series, ordered by timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub unique_id: String,
    pub values: Vec<f64>,
}

impl Series {
    pub fn new<S: Into<String>>(unique_id: S, values: Vec<f64>) -> Self {
        Self {
            unique_id: unique_id.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// All target series of a dataset in a stable order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesTable {
    pub series: Vec<Series>,
}

impl SeriesTable {
    pub fn new(series: Vec<Series>) -> Self {
        Self { series }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.series.iter()
    }

    pub fn unique_ids(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.unique_id.as_str()).collect()
    }
}

/// Numeric feature rows keyed by series identifier.
/// Static tables hold one row per series; exogenous tables one row per observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub unique_id: String,
    pub values: Vec<f64>,
}

impl FeatureTable {
    /// First row recorded for a series
    pub fn row(&self, unique_id: &str) -> Option<&[f64]> {
        self.rows
            .iter()
            .find(|row| row.unique_id == unique_id)
            .map(|row| row.values.as_slice())
    }

    /// Rows keyed by series identifier; the first row recorded for a series wins
    pub fn index(&self) -> HashMap<&str, &[f64]> {
        let mut index = HashMap::with_capacity(self.rows.len());
        for row in &self.rows {
            index.entry(row.unique_id.as_str()).or_insert(row.values.as_slice());
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Everything loaded for one frequency group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub series: SeriesTable,
    pub exogenous: Option<FeatureTable>,
    pub statics: Option<FeatureTable>,
}

/// Source of per-group datasets.
/// Implementations fail with `DatasetLoad` when the group is unknown or its files are missing.
pub trait DatasetLoader {
    fn load(&self, group_name: &str) -> Result<Dataset>;
}
