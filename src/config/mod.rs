use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::orchestrator::{FailurePolicy, OrchestratorOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub training: TrainingConfig,
    pub resources: ResourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root holding one `{group}/Y_df.csv` directory per frequency group
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub val_freq_steps: usize,
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Free memory required before each model is instantiated; 0 disables the check
    pub min_free_memory_gb: f64,
}

impl Config {
    /// Load from `.env` in the working directory and the process environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from an explicit env file when given, otherwise from `.env` if present.
    /// Variables already set in the environment take precedence over the file.
    pub fn load_from(env_file: Option<&str>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenv::from_filename(path).with_context(|| format!("Failed to read config file {}", path))?;
            }
            None => {
                dotenv::dotenv().ok();
            }
        }

        let defaults = Config::default();

        let config = Config {
            data: DataConfig {
                data_dir: env::var("NBEATS_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.data.data_dir),
                output_dir: env::var("NBEATS_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.data.output_dir),
            },
            training: TrainingConfig {
                val_freq_steps: env::var("NBEATS_VAL_FREQ_STEPS")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .context("Invalid NBEATS_VAL_FREQ_STEPS value")?,
                failure_policy: env::var("NBEATS_FAILURE_POLICY")
                    .unwrap_or_else(|_| "abort-group".to_string())
                    .parse()
                    .map_err(|e: String| anyhow!(e))
                    .context("Invalid NBEATS_FAILURE_POLICY value (use abort-group/skip-member)")?,
            },
            resources: ResourceConfig {
                min_free_memory_gb: env::var("NBEATS_MIN_FREE_MEMORY_GB")
                    .unwrap_or_else(|_| "1.0".to_string())
                    .parse()
                    .context("Invalid NBEATS_MIN_FREE_MEMORY_GB value")?,
            },
        };

        Ok(config)
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            val_freq_steps: self.training.val_freq_steps,
            failure_policy: self.training.failure_policy,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                data_dir: PathBuf::from("data"),
                output_dir: PathBuf::from("results"),
            },
            training: TrainingConfig {
                val_freq_steps: 100,
                failure_policy: FailurePolicy::AbortGroup,
            },
            resources: ResourceConfig {
                min_free_memory_gb: 1.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.data.data_dir, PathBuf::from("data"));
        assert_eq!(config.training.val_freq_steps, 100);
        assert_eq!(config.training.failure_policy, FailurePolicy::AbortGroup);

        let options = config.orchestrator_options();
        assert_eq!(options.val_freq_steps, 100);
    }

    #[test]
    fn test_missing_env_file_is_an_error() {
        assert!(Config::load_from(Some("/nonexistent/nbeats.env")).is_err());
    }

    #[test]
    fn test_serializes_policy_in_kebab_case() {
        let mut config = Config::default();
        config.training.failure_policy = FailurePolicy::SkipMember;
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["training"]["failure_policy"], "skip-member");
    }
}
