//! Cartesian product expansion of hyperparameter grids

use tracing::debug;

use super::{HyperparameterGrid, HyperparameterRow};
use crate::errors::Result;

/// Expand a grid into every combination of one value per parameter.
///
/// Rows are enumerated like an odometer: parameters in insertion order, the
/// last parameter varying fastest. The order only depends on the grid, so the
/// same grid always expands to the same sequence.
pub fn expand(grid: &HyperparameterGrid) -> Result<Vec<HyperparameterRow>> {
    grid.validate()?;

    let entries: Vec<_> = grid.iter().collect();
    let total = grid.combinations()?;
    let mut rows = Vec::with_capacity(total);
    let mut positions = vec![0usize; entries.len()];

    for _ in 0..total {
        let mut row = HyperparameterRow::new();
        for ((name, values), &position) in entries.iter().zip(&positions) {
            row.set(name, values[position].clone());
        }
        rows.push(row);

        for slot in (0..positions.len()).rev() {
            positions[slot] += 1;
            if positions[slot] < entries[slot].1.len() {
                break;
            }
            positions[slot] = 0;
        }
    }

    debug!(parameters = entries.len(), rows = rows.len(), "Expanded hyperparameter grid");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EnsembleError;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_last_key_varies_fastest() {
        let grid = HyperparameterGrid::new()
            .with("n_time_in", [12, 18])
            .with("loss_train", ["MAPE", "SMAPE", "MASE"]);

        let rows = expand(&grid).unwrap();
        assert_eq!(rows.len(), 6);

        let pairs: Vec<(i64, String)> = rows
            .iter()
            .map(|row| {
                (
                    row.get("n_time_in").and_then(|v| v.as_i64()).unwrap(),
                    row.get("loss_train").and_then(|v| v.as_str()).unwrap().to_string(),
                )
            })
            .collect();

        assert_eq!(pairs[0], (12, "MAPE".to_string()));
        assert_eq!(pairs[1], (12, "SMAPE".to_string()));
        assert_eq!(pairs[2], (12, "MASE".to_string()));
        assert_eq!(pairs[3], (18, "MAPE".to_string()));
        assert_eq!(pairs[5], (18, "MASE".to_string()));
    }

    #[test]
    fn test_product_size_and_uniqueness() {
        let grid = HyperparameterGrid::new()
            .with("a", [1, 2, 3])
            .with("b", [true, false])
            .with("c", ["x"])
            .with("d", [0.1, 0.2]);

        let rows = expand(&grid).unwrap();
        assert_eq!(rows.len(), 3 * 2 * 1 * 2);

        let distinct: HashSet<String> = rows.iter().map(|row| row.to_string()).collect();
        assert_eq!(distinct.len(), rows.len(), "every row should be a unique combination");
    }

    #[test]
    fn test_list_values_are_kept_whole() {
        let grid = HyperparameterGrid::new()
            .with("stack_types", [json!(["trend", "seasonality"])])
            .with("n_blocks", [json!([3, 3]), json!([1, 1])]);

        let rows = expand(&grid).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("n_blocks"), Some(&json!([1, 1])));
        assert_eq!(rows[0].get("stack_types"), Some(&json!(["trend", "seasonality"])));
    }

    #[test]
    fn test_expansion_is_reproducible() {
        let grid = HyperparameterGrid::new()
            .with("x", [3, 1, 2])
            .with("y", ["b", "a"]);
        assert_eq!(expand(&grid).unwrap(), expand(&grid).unwrap());
    }

    #[test]
    fn test_empty_grid_yields_single_empty_row() {
        let rows = expand(&HyperparameterGrid::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_empty());
    }

    #[test]
    fn test_empty_candidate_list_fails() {
        let grid = HyperparameterGrid::new()
            .with("a", [1])
            .with("b", Vec::<i64>::new());
        assert!(matches!(expand(&grid), Err(EnsembleError::InvalidGrid { .. })));
    }
}
