//! File-backed dataset loader
//! Reads `{root}/{group}/Y_df.csv` (`unique_id,ds,y`) plus optional `S_df.csv` and `X_df.csv`

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Dataset, DatasetLoader, FeatureRow, FeatureTable, Series, SeriesTable};
use crate::errors::{EnsembleError, Result};

const TARGET_FILE: &str = "Y_df.csv";
const STATIC_FILE: &str = "S_df.csv";
const EXOGENOUS_FILE: &str = "X_df.csv";

#[derive(Debug, Deserialize)]
struct Observation {
    unique_id: String,
    ds: String,
    y: f64,
}

/// Timestamps are either integer steps (M4 style) or calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stamp {
    Step(i64),
    Time(NaiveDateTime),
}

fn parse_stamp(raw: &str) -> Option<Stamp> {
    let raw = raw.trim();
    if let Ok(step) = raw.parse::<i64>() {
        return Some(Stamp::Step(step));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(Stamp::Time);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(Stamp::Time)
}

/// Loads each group from its own directory under `root`
#[derive(Debug, Clone)]
pub struct CsvDatasetLoader {
    root: PathBuf,
}

impl CsvDatasetLoader {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_series(group: &str, path: &Path) -> Result<SeriesTable> {
        let mut reader = csv::Reader::from_path(path)
            .map_err(|e| EnsembleError::dataset_load(group, format!("{}: {}", path.display(), e)))?;

        // series in order of first appearance, observations stamped for sorting
        let mut ids: Vec<String> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut observations: Vec<Vec<(Stamp, f64)>> = Vec::new();

        for (line, record) in reader.deserialize::<Observation>().enumerate() {
            let record = record.map_err(|e| {
                EnsembleError::dataset_load(group, format!("{} row {}: {}", path.display(), line + 1, e))
            })?;
            let stamp = parse_stamp(&record.ds).ok_or_else(|| {
                EnsembleError::dataset_load(
                    group,
                    format!("{} row {}: unrecognised ds '{}'", path.display(), line + 1, record.ds),
                )
            })?;

            let slot = match slots.get(&record.unique_id) {
                Some(&slot) => slot,
                None => {
                    slots.insert(record.unique_id.clone(), ids.len());
                    ids.push(record.unique_id.clone());
                    observations.push(Vec::new());
                    ids.len() - 1
                }
            };
            observations[slot].push((stamp, record.y));
        }

        if ids.is_empty() {
            return Err(EnsembleError::dataset_load(
                group,
                format!("{} contains no observations", path.display()),
            ));
        }

        let series = ids
            .into_iter()
            .zip(observations)
            .map(|(id, mut points)| {
                points.sort_by_key(|(stamp, _)| *stamp);
                Series::new(id, points.into_iter().map(|(_, y)| y).collect())
            })
            .collect();

        Ok(SeriesTable::new(series))
    }

    /// Feature file with `unique_id` first; `skip` further leading columns are ignored
    fn read_features(group: &str, path: &Path, skip: usize) -> Result<FeatureTable> {
        let load_err = |detail: String| EnsembleError::dataset_load(group, format!("{}: {}", path.display(), detail));

        let mut reader = csv::Reader::from_path(path).map_err(|e| load_err(e.to_string()))?;
        let headers = reader.headers().map_err(|e| load_err(e.to_string()))?.clone();
        if headers.get(0) != Some("unique_id") {
            return Err(load_err("first column must be unique_id".to_string()));
        }

        let columns: Vec<String> = headers.iter().skip(1 + skip).map(String::from).collect();
        let mut rows = Vec::new();

        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| load_err(e.to_string()))?;
            let unique_id = record.get(0).unwrap_or_default().to_string();
            let values = record
                .iter()
                .skip(1 + skip)
                .map(|field| {
                    field.trim().parse::<f64>().map_err(|_| {
                        load_err(format!("row {}: '{}' is not numeric", line + 1, field))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            rows.push(FeatureRow { unique_id, values });
        }

        Ok(FeatureTable { columns, rows })
    }
}

impl DatasetLoader for CsvDatasetLoader {
    fn load(&self, group_name: &str) -> Result<Dataset> {
        let dir = self.root.join(group_name);
        if !dir.is_dir() {
            return Err(EnsembleError::dataset_load(
                group_name,
                format!("directory {} not found", dir.display()),
            ));
        }

        let series = Self::read_series(group_name, &dir.join(TARGET_FILE))?;

        let static_path = dir.join(STATIC_FILE);
        let statics = if static_path.is_file() {
            Some(Self::read_features(group_name, &static_path, 0)?)
        } else {
            None
        };

        let exogenous_path = dir.join(EXOGENOUS_FILE);
        let exogenous = if exogenous_path.is_file() {
            Some(Self::read_features(group_name, &exogenous_path, 1)?)
        } else {
            None
        };

        let observations: usize = series.iter().map(Series::len).sum();
        info!(
            group = group_name,
            series = series.len(),
            observations,
            "Loaded dataset"
        );
        debug!(
            group = group_name,
            has_statics = statics.is_some(),
            has_exogenous = exogenous.is_some(),
            "Optional feature tables"
        );

        Ok(Dataset {
            series,
            exogenous,
            statics,
        })
    }
}
