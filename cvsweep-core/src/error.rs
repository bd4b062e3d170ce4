//! Error types for the cvsweep-core crate.
//!
//! Uses `thiserror` for the public error taxonomy. Per-trial failures
//! (`UnknownModel`, `Evaluation`) are converted into trial data by the sweep
//! controller; every other `SweepError` variant terminates a sweep.

use crate::data::Label;

/// Top-level error type for partitioning, evaluation and sweep control.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Insufficient samples: k={k} exceeds the {count} samples of class '{label}'")]
    InsufficientSamples { k: usize, label: Label, count: usize },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Evaluation failed on fold {fold}: {cause}")]
    Evaluation {
        fold: usize,
        #[source]
        cause: ModelError,
    },

    #[error("Invalid sampling mode: {0}")]
    InvalidMode(String),

    #[error("Run recorder unavailable for trial {trial} after {attempts} attempts: {cause}")]
    RecorderUnavailable {
        trial: usize,
        attempts: u32,
        #[source]
        cause: RecorderError,
    },

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Invalid search space: {0}")]
    InvalidSearchSpace(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Sweep cannot start from state {0}")]
    InvalidState(crate::training::SweepState),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl SweepError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_mode(msg: impl Into<String>) -> Self {
        Self::InvalidMode(msg.into())
    }

    pub fn invalid_search_space(msg: impl Into<String>) -> Self {
        Self::InvalidSearchSpace(msg.into())
    }

    /// Whether this error only invalidates a single trial.
    pub fn is_trial_scoped(&self) -> bool {
        matches!(self, Self::UnknownModel(_) | Self::Evaluation { .. })
    }
}

/// Errors raised while constructing or loading a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset has no samples")]
    Empty,

    #[error("{features} feature rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("row {row} has {found} features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("non-finite feature value at row {row}, column {column}")]
    NonFinite { row: usize, column: usize },

    #[error("cannot parse '{value}' at row {row}, column {column} as a number")]
    InvalidCell {
        row: usize,
        column: usize,
        value: String,
    },

    #[error("sample index {index} out of range for {len} samples")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("holdout fraction must be in (0, 1), got {0}")]
    InvalidFraction(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised by a model during construction, fitting, prediction or scoring.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("model has not been fitted")]
    NotFitted,

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("expected {expected} features, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("scoring failed: {0}")]
    Scoring(String),

    #[error("fit failed: {0}")]
    Fit(String),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl ModelError {
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn scoring(msg: impl Into<String>) -> Self {
        Self::Scoring(msg.into())
    }
}

/// Errors from a single run-recorder call.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("recorder unavailable: {0}")]
    Unavailable(String),

    #[error("invalid artifact name: {0}")]
    InvalidArtifactName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_scoped_errors() {
        assert!(SweepError::UnknownModel("svm".into()).is_trial_scoped());
        assert!(
            SweepError::Evaluation {
                fold: 2,
                cause: ModelError::NotFitted
            }
            .is_trial_scoped()
        );
        assert!(!SweepError::invalid_mode("grid").is_trial_scoped());
    }

    #[test]
    fn test_evaluation_error_display_keeps_cause() {
        let err = SweepError::Evaluation {
            fold: 3,
            cause: ModelError::invalid_parameter("n_neighbors", "must be positive"),
        };
        assert_eq!(
            err.to_string(),
            "Evaluation failed on fold 3: invalid parameter 'n_neighbors': must be positive"
        );
    }
}
