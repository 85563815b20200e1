//! M4 frequency groups and their default NBEATS grids

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write;

use super::HyperparameterGrid;
use crate::errors::{EnsembleError, Result};

/// Lookback multiples of the horizon swept by the default grids
pub const DEFAULT_LOOKBACKS: [usize; 6] = [2, 3, 4, 5, 6, 7];

/// A forecasting domain with its own horizon and seasonality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyGroup {
    pub name: String,
    pub horizon: usize,
    pub seasonality: usize,
    /// Pandas-style frequency alias
    pub frequency: String,
}

impl FrequencyGroup {
    pub fn new(name: &str, horizon: usize, seasonality: usize, frequency: &str) -> Self {
        Self {
            name: name.to_string(),
            horizon,
            seasonality,
            frequency: frequency.to_string(),
        }
    }

    pub fn yearly() -> Self {
        Self::new("Yearly", 6, 1, "Y")
    }

    pub fn quarterly() -> Self {
        Self::new("Quarterly", 8, 4, "Q")
    }

    pub fn monthly() -> Self {
        Self::new("Monthly", 18, 12, "M")
    }

    /// Look up one of the M4 groups by name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "yearly" => Some(Self::yearly()),
            "quarterly" => Some(Self::quarterly()),
            "monthly" => Some(Self::monthly()),
            _ => None,
        }
    }
}

/// Grids to sweep for one frequency group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub group: FrequencyGroup,
    pub architecture_grid: HyperparameterGrid,
    pub ensemble_grid: HyperparameterGrid,
}

impl GroupSpec {
    pub fn new(
        group: FrequencyGroup,
        architecture_grid: HyperparameterGrid,
        ensemble_grid: HyperparameterGrid,
    ) -> Self {
        Self {
            group,
            architecture_grid,
            ensemble_grid,
        }
    }

    /// Default NBEATS-I grid for an M4 group with the given lookback multiples
    pub fn m4(group: FrequencyGroup, lookbacks: &[usize]) -> Self {
        let frequency_grid = HyperparameterGrid::new()
            .with("n_time_in", lookbacks.iter().map(|lookback| group.horizon * lookback))
            .with("n_time_out", [group.horizon])
            .with("train_sample_freq", [1])
            .with("frequency", [group.frequency.as_str()])
            .with("seasonality", [group.seasonality])
            .with("l_h", [1.5]);

        let architecture_grid = common_grid().merged(&frequency_grid);
        Self::new(group, architecture_grid, ensemble_grid())
    }

    /// Architecture and ensemble grids combined into one
    pub fn combined_grid(&self) -> HyperparameterGrid {
        self.architecture_grid.merged(&self.ensemble_grid)
    }

    /// Number of models a full fit of this group trains
    pub fn model_count(&self) -> Result<usize> {
        let architectures = self.architecture_grid.combinations()?;
        let members = self.ensemble_grid.combinations()?;
        architectures
            .checked_mul(members)
            .ok_or_else(|| EnsembleError::invalid_grid("ensemble_grid", "overflows the number of models"))
    }
}

/// Architecture, optimization and data settings shared by every M4 group
pub fn common_grid() -> HyperparameterGrid {
    let n_layers = [4usize, 4];

    HyperparameterGrid::new()
        // Architecture
        .with("activation", ["ReLU"])
        .with("n_x", [0])
        .with("n_s", [0])
        .with("n_x_hidden", [0])
        .with("n_s_hidden", [0])
        .with("stack_types", [json!(["trend", "seasonality"])])
        .with("n_blocks", [json!([3, 3])])
        .with("n_layers", [json!(n_layers)])
        .with("shared_weights", [true])
        .with("n_harmonics", [1])
        .with("n_polynomials", [2])
        .with(
            "n_theta_hidden",
            [json!([vec![256; n_layers[0]], vec![2048; n_layers[1]]])],
        )
        .with("initialization", ["lecun_normal"])
        // Optimization
        .with("learning_rate", [0.001])
        .with("lr_decay", [0.0])
        .with("lr_decay_step_size", [1_000])
        .with("loss_val", ["SMAPE"])
        .with("dropout_prob_theta", [0.0])
        .with("weight_decay", [0.0])
        .with("batch_size", [1024])
        .with("batch_normalization", [false])
        // Data
        .with("complete_inputs", [false])
        .with("mode", ["simple"])
}

/// Loss function, step budget and seed swept per architecture row
pub fn ensemble_grid() -> HyperparameterGrid {
    HyperparameterGrid::new()
        .with("loss_train", ["MAPE", "SMAPE", "MASE"])
        .with("n_steps", [260])
        .with("random_seed", [0])
}

/// Render each group's combined grid with its number of model configurations
pub fn describe_groups(specs: &[GroupSpec], table_width: usize) -> String {
    let rule = "=".repeat(table_width);
    let mut out = String::new();

    for spec in specs {
        let combined = spec.combined_grid();
        let name_width = combined.names().map(str::len).max().unwrap_or(0);

        let _ = writeln!(
            out,
            "\n{} grid (# of different model configurations = {}):",
            spec.group.name,
            combined
                .combinations()
                .map(|n| n.to_string())
                .unwrap_or_else(|e| e.to_string())
        );
        let _ = writeln!(out, "{}", rule);
        for (name, values) in combined.iter() {
            let _ = writeln!(out, "{:<width$}  {}", name, json!(values), width = name_width);
        }
        let _ = writeln!(out, "{}", rule);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_m4_group_constants() {
        let yearly = FrequencyGroup::yearly();
        assert_eq!((yearly.horizon, yearly.seasonality), (6, 1));

        let quarterly = FrequencyGroup::quarterly();
        assert_eq!((quarterly.horizon, quarterly.seasonality), (8, 4));

        let monthly = FrequencyGroup::monthly();
        assert_eq!((monthly.horizon, monthly.seasonality), (18, 12));
        assert_eq!(monthly.frequency, "M");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(FrequencyGroup::from_name("monthly"), Some(FrequencyGroup::monthly()));
        assert_eq!(FrequencyGroup::from_name(" Yearly "), Some(FrequencyGroup::yearly()));
        assert_eq!(FrequencyGroup::from_name("Hourly"), None);
    }

    #[test]
    fn test_m4_spec_lookbacks() {
        let spec = GroupSpec::m4(FrequencyGroup::quarterly(), &DEFAULT_LOOKBACKS);

        let n_time_in = spec.architecture_grid.get("n_time_in").unwrap();
        assert_eq!(
            n_time_in,
            &[json!(16), json!(24), json!(32), json!(40), json!(48), json!(56)][..]
        );
        assert_eq!(spec.architecture_grid.get("seasonality"), Some(&[json!(4)][..]));
        assert_eq!(spec.architecture_grid.combinations().unwrap(), 6);
        assert_eq!(spec.ensemble_grid.combinations().unwrap(), 3);
        assert_eq!(spec.model_count().unwrap(), 18);
    }

    #[test]
    fn test_theta_hidden_follows_layers() {
        let grid = common_grid();
        let theta = &grid.get("n_theta_hidden").unwrap()[0];
        assert_eq!(theta[0].as_array().map(Vec::len), Some(4));
        assert_eq!(theta[1][0], json!(2048));
    }

    #[test]
    fn test_specs_do_not_share_grids() {
        let mut yearly = GroupSpec::m4(FrequencyGroup::yearly(), &[2]);
        let monthly = GroupSpec::m4(FrequencyGroup::monthly(), &[2]);

        yearly.ensemble_grid.insert("random_seed", [1, 2, 3]);
        assert_eq!(monthly.ensemble_grid.get("random_seed"), Some(&[json!(0)][..]));
    }

    #[test]
    fn test_describe_groups_header() {
        let spec = GroupSpec::m4(FrequencyGroup::yearly(), &[2, 3]);
        let text = describe_groups(&[spec], 40);

        assert!(text.contains("Yearly grid (# of different model configurations = 6):"));
        assert!(text.contains(&"=".repeat(40)));
        assert!(text.contains("loss_train"));
    }
}
