use thiserror::Error;

/// Error types for grid expansion, dataset loading and ensemble training
#[derive(Error, Debug)]
pub enum EnsembleError {
    #[error("Invalid grid: parameter '{parameter}' {reason}")]
    InvalidGrid { parameter: String, reason: String },

    #[error("Invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load dataset for group {group}: {reason}")]
    DatasetLoad { group: String, reason: String },

    #[error("Training failed for model m_{model_index}: {reason}")]
    TrainingFailure { model_index: usize, reason: String },

    #[error("Aggregation error for group {group}: {reason}")]
    Aggregation { group: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ensemble operations
pub type Result<T> = std::result::Result<T, EnsembleError>;

impl EnsembleError {
    /// Whether the error ends processing of the whole frequency group.
    /// Only training failures can be recovered from, and only under the skip-member policy.
    pub fn is_group_fatal(&self) -> bool {
        !matches!(self, EnsembleError::TrainingFailure { .. })
    }

    /// Short machine-readable name used in run summaries
    pub fn kind(&self) -> &'static str {
        match self {
            EnsembleError::InvalidGrid { .. } => "invalid_grid",
            EnsembleError::InvalidConfig(_) => "invalid_config",
            EnsembleError::DatasetLoad { .. } => "dataset_load",
            EnsembleError::TrainingFailure { .. } => "training_failure",
            EnsembleError::Aggregation { .. } => "aggregation",
            EnsembleError::Io(_) => "io",
            EnsembleError::Csv(_) => "csv",
            EnsembleError::Serialization(_) => "serialization",
        }
    }

    pub fn invalid_grid<S: Into<String>>(parameter: S, reason: S) -> Self {
        EnsembleError::InvalidGrid {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn dataset_load<G: Into<String>, R: Into<String>>(group: G, reason: R) -> Self {
        EnsembleError::DatasetLoad {
            group: group.into(),
            reason: reason.into(),
        }
    }

    pub fn training<R: Into<String>>(model_index: usize, reason: R) -> Self {
        EnsembleError::TrainingFailure {
            model_index,
            reason: reason.into(),
        }
    }

    pub fn aggregation<G: Into<String>, R: Into<String>>(group: G, reason: R) -> Self {
        EnsembleError::Aggregation {
            group: group.into(),
            reason: reason.into(),
        }
    }

    /// Re-labels any error raised while building, training or predicting one
    /// ensemble member as a training failure of that member.
    pub fn into_training_failure(self, model_index: usize) -> Self {
        match self {
            EnsembleError::TrainingFailure { reason, .. } => EnsembleError::training(model_index, reason),
            other => EnsembleError::training(model_index, other.to_string()),
        }
    }
}
