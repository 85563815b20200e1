//! Reduction of member forecasts into one ensemble forecast per series

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::forecast::{ForecastTable, SeriesForecast};
use crate::errors::{EnsembleError, Result};

/// Combines the members' values for one (series, step) cell
pub trait EnsembleCombiner {
    fn combine(&self, values: &mut [f64]) -> f64;
}

/// Median across members; the mean of the two middle values for an even count
#[derive(Debug, Clone, Copy, Default)]
pub struct MedianCombiner;

impl EnsembleCombiner for MedianCombiner {
    fn combine(&self, values: &mut [f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        }
    }
}

/// Aggregated forecast of one frequency group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub group: String,
    pub n_members: usize,
    pub horizon: usize,
    pub rows: Vec<SeriesForecast>,
}

impl EnsembleResult {
    pub fn get(&self, unique_id: &str) -> Option<&[f64]> {
        self.rows
            .iter()
            .find(|row| row.unique_id == unique_id)
            .map(|row| row.values.as_slice())
    }
}

/// Per-series median of all member forecasts
pub fn aggregate_median(group: &str, members: &[ForecastTable]) -> Result<EnsembleResult> {
    aggregate(group, members, &MedianCombiner)
}

/// Group member forecasts by series identifier and reduce every step independently.
///
/// Every member must forecast the same series, once each, over the same horizon.
/// Output rows follow the series order of the first member.
pub fn aggregate<C: EnsembleCombiner>(
    group: &str,
    members: &[ForecastTable],
    combiner: &C,
) -> Result<EnsembleResult> {
    let first = members
        .first()
        .ok_or_else(|| EnsembleError::aggregation(group, "no member forecasts to aggregate"))?;
    let horizon = first.horizon();

    let mut expected: HashSet<&str> = HashSet::with_capacity(first.rows.len());
    for row in &first.rows {
        if !expected.insert(row.unique_id.as_str()) {
            return Err(EnsembleError::aggregation(
                group,
                format!("{} forecasts series {} more than once", first.model, row.unique_id),
            ));
        }
    }

    // one lookup table per member, built once
    let mut indexed: Vec<HashMap<&str, &[f64]>> = Vec::with_capacity(members.len());
    for member in members {
        if member.rows.len() != expected.len() {
            return Err(EnsembleError::aggregation(
                group,
                format!(
                    "{} has {} rows, expected {}",
                    member.model,
                    member.rows.len(),
                    expected.len()
                ),
            ));
        }
        let mut by_series: HashMap<&str, &[f64]> = HashMap::with_capacity(member.rows.len());
        for row in &member.rows {
            let id = row.unique_id.as_str();
            if !expected.contains(id) || by_series.insert(id, row.values.as_slice()).is_some() {
                return Err(EnsembleError::aggregation(
                    group,
                    format!("{} has an unexpected row for series {}", member.model, row.unique_id),
                ));
            }
            if row.values.len() != horizon {
                return Err(EnsembleError::aggregation(
                    group,
                    format!(
                        "{} forecasts {} steps for series {}, expected {}",
                        member.model,
                        row.values.len(),
                        row.unique_id,
                        horizon
                    ),
                ));
            }
        }
        indexed.push(by_series);
    }

    let mut rows = Vec::with_capacity(first.rows.len());
    let mut column = Vec::with_capacity(members.len());
    for row in &first.rows {
        let id = row.unique_id.as_str();
        let per_member: Vec<&[f64]> = indexed
            .iter()
            .filter_map(|by_series| by_series.get(id).copied())
            .collect();

        let values = (0..horizon)
            .map(|step| {
                column.clear();
                column.extend(per_member.iter().map(|values| values[step]));
                combiner.combine(&mut column)
            })
            .collect();

        rows.push(SeriesForecast {
            unique_id: row.unique_id.clone(),
            values,
        });
    }

    Ok(EnsembleResult {
        group: group.to_string(),
        n_members: members.len(),
        horizon,
        rows,
    })
}
