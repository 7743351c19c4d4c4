//! Error types for the mathscore crate
//!
//! Two layers:
//! - [`ModelError`] is raised by regressors, metrics, grid search and I/O helpers.
//! - [`TrainerError`] is the only error the model trainer hands to callers. A rejected
//!   configuration is [`TrainerError::Config`]; every other `ModelError` is wrapped into
//!   [`TrainerError::Training`] together with the name of the algorithm that was being
//!   processed.
//! - [`PipelineError`] joins both for the CSV-to-artifact pipelines.

use thiserror::Error;

/// Result type alias for model-level operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Low-level error raised while fitting, scoring or persisting models
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ModelError {
    /// Shorthand for a rejected hyperparameter value
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        ModelError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for ModelError {
    fn from(err: bincode::Error) -> Self {
        ModelError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ModelError {
    fn from(err: ndarray::ShapeError) -> Self {
        ModelError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<polars::error::PolarsError> for ModelError {
    fn from(err: polars::error::PolarsError) -> Self {
        ModelError::DataError(err.to_string())
    }
}

/// Error surfaced at the trainer boundary
#[derive(Error, Debug)]
pub enum TrainerError {
    /// The trainer configuration was rejected before any work started
    #[error("Invalid trainer configuration: {0}")]
    Config(#[source] ModelError),

    /// Search, fit, score or persistence failed for one algorithm; the run is aborted
    #[error("Training failed for '{algorithm}': {source}")]
    Training {
        algorithm: String,
        #[source]
        source: ModelError,
    },

    /// The best score across the whole catalog is below the configured minimum
    #[error("No model reached the minimum score {threshold:.4} (best: {best_score:.4})")]
    QualityThreshold {
        best_model: Option<String>,
        best_score: f64,
        threshold: f64,
    },
}

impl TrainerError {
    pub(crate) fn training(algorithm: impl Into<String>, source: ModelError) -> Self {
        TrainerError::Training {
            algorithm: algorithm.into(),
            source,
        }
    }

    /// Name of the algorithm involved, if any
    pub fn algorithm(&self) -> Option<&str> {
        match self {
            TrainerError::Config(_) => None,
            TrainerError::Training { algorithm, .. } => Some(algorithm),
            TrainerError::QualityThreshold { best_model, .. } => best_model.as_deref(),
        }
    }
}

/// Error raised by the end-to-end train and predict pipelines
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Loading, splitting, encoding or artifact I/O failed
    #[error(transparent)]
    Data(#[from] ModelError),

    #[error(transparent)]
    Trainer(#[from] TrainerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ModelError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ModelError = io_err.into();
        assert!(matches!(err, ModelError::IoError(_)));
    }

    #[test]
    fn test_training_error_keeps_algorithm_and_source() {
        let err = TrainerError::training("Linear Regression", ModelError::ModelNotFitted);
        assert_eq!(err.algorithm(), Some("Linear Regression"));
        assert!(err.to_string().contains("Linear Regression"));
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "Model not fitted");
    }

    #[test]
    fn test_config_error_has_no_algorithm() {
        let err = TrainerError::Config(ModelError::ConfigError("cv_folds must be at least 2, got 1".to_string()));
        assert_eq!(err.algorithm(), None);
        assert_eq!(
            err.to_string(),
            "Invalid trainer configuration: Configuration error: cv_folds must be at least 2, got 1"
        );
    }

    #[test]
    fn test_quality_threshold_display() {
        let err = TrainerError::QualityThreshold {
            best_model: Some("KNN".to_string()),
            best_score: 0.5,
            threshold: 0.6,
        };
        assert_eq!(
            err.to_string(),
            "No model reached the minimum score 0.6000 (best: 0.5000)"
        );
    }
}
