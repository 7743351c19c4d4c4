//! mathscore - Student math score regression
//!
//! This crate trains a catalog of tuned regressors on student performance data,
//! keeps the best one and serves predictions from it.
//!
//! # Modules
//!
//! - [`training`] - Regressors, hyperparameter grids, cross-validation, grid search,
//!   the model catalog and the trainer that selects and persists the winner
//! - [`export`] - Model artifact persistence
//! - [`pipeline`] - CSV loading, feature encoding, train and predict pipelines
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core ML modules
pub mod training;
pub mod export;
pub mod pipeline;

// Services
pub mod cli;

pub use error::{ModelError, PipelineError, Result, TrainerError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ModelError, PipelineError, Result, TrainerError};

    // Training
    pub use crate::training::{
        Estimator, EvaluationReport, FittedModel, ModelCatalog, ModelTrainer, ParamGrid,
        ParamSet, TrainerConfig,
    };

    // Persistence
    pub use crate::export::ModelArtifact;

    // Pipelines
    pub use crate::pipeline::{PredictPipeline, StudentDataset, StudentRecord, TrainPipeline};
}
