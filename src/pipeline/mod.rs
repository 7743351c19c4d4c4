//! End-to-end pipelines over the student performance data
//!
//! - [`TrainPipeline`] turns a CSV into a persisted model and preprocessor.
//! - [`PredictPipeline`] loads both and scores new [`StudentRecord`]s.

mod dataset;
mod features;
mod predict;
mod train;

pub use dataset::{StudentDataset, TARGET_COLUMN};
pub use features::{
    n_encoded_features, Preprocessor, StudentRecord, CATEGORICAL_COLUMNS, GENDERS, LUNCH,
    NUMERIC_COLUMNS, PARENTAL_EDUCATION, RACE_ETHNICITIES, TEST_PREPARATION,
};
pub use predict::PredictPipeline;
pub use train::{TrainOutcome, TrainPipeline};

pub const DEFAULT_MODEL_PATH: &str = "artifacts/model.bin";
pub const DEFAULT_PREPROCESSOR_PATH: &str = "artifacts/preprocessor.bin";
