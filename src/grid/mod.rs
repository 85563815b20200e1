//! Hyperparameter grids and the rows expanded from them
//! Values are kept as JSON so that grids can mix scalars, strings and nested lists

pub mod expander;
pub mod presets;

pub use expander::expand;
pub use presets::{common_grid, describe_groups, ensemble_grid, FrequencyGroup, GroupSpec, DEFAULT_LOOKBACKS};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::errors::{EnsembleError, Result};

/// Ordered mapping of parameter name to candidate values.
/// Insertion order is kept; it determines the enumeration order of the expanded rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterGrid {
    entries: Vec<(String, Vec<Value>)>,
}

impl HyperparameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.insert(name, values);
        self
    }

    /// Set the candidates for a parameter. An existing parameter keeps its position.
    pub fn insert<I, V>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((name.to_string(), values)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Union of two grids. Parameters from `other` replace ours.
    pub fn merged(&self, other: &HyperparameterGrid) -> HyperparameterGrid {
        let mut merged = self.clone();
        for (name, values) in &other.entries {
            merged.insert(name, values.iter().cloned());
        }
        merged
    }

    /// Number of rows the grid expands to
    pub fn combinations(&self) -> Result<usize> {
        self.entries.iter().try_fold(1usize, |total, (name, values)| {
            total.checked_mul(values.len()).ok_or_else(|| {
                EnsembleError::invalid_grid(name.as_str(), "overflows the number of combinations")
            })
        })
    }

    /// Every parameter must carry at least one candidate value
    pub fn validate(&self) -> Result<()> {
        for (name, values) in &self.entries {
            if values.is_empty() {
                return Err(EnsembleError::invalid_grid(
                    name.as_str(),
                    "has no candidate values",
                ));
            }
        }
        Ok(())
    }
}

/// One concrete assignment of a value to every parameter of a grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterRow {
    values: Vec<(String, Value)>,
}

impl HyperparameterRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<V: Into<Value>>(&mut self, name: &str, value: V) {
        let value = value.into();
        match self.values.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Mapping union of two rows. Keys present in both take the value from `overrides`.
    pub fn merge(&self, overrides: &HyperparameterRow) -> HyperparameterRow {
        let mut merged = self.clone();
        for (name, value) in &overrides.values {
            merged.set(name, value.clone());
        }
        merged
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Value::Object(map)
    }
}

impl fmt::Display for HyperparameterRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}
