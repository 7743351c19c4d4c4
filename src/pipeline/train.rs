//! CSV to persisted model

use super::dataset::StudentDataset;
use super::features::Preprocessor;
use super::DEFAULT_PREPROCESSOR_PATH;
use crate::error::PipelineError;
use crate::training::{EvaluationReport, ModelCatalog, ModelTrainer, TrainerConfig};
use std::path::{Path, PathBuf};
use tracing::info;

/// Summary of a successful training run
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model_name: String,
    /// Test R² of the persisted model
    pub score: f64,
    pub n_train: usize,
    pub n_test: usize,
    pub report: EvaluationReport,
}

/// Load, split, encode, train and persist
#[derive(Debug, Clone)]
pub struct TrainPipeline {
    trainer_config: TrainerConfig,
    preprocessor_path: PathBuf,
    test_ratio: f64,
    split_seed: u64,
}

impl Default for TrainPipeline {
    fn default() -> Self {
        Self {
            trainer_config: TrainerConfig::default(),
            preprocessor_path: PathBuf::from(DEFAULT_PREPROCESSOR_PATH),
            test_ratio: 0.2,
            split_seed: 42,
        }
    }
}

impl TrainPipeline {
    pub fn new(trainer_config: TrainerConfig) -> Self {
        Self {
            trainer_config,
            ..Default::default()
        }
    }

    pub fn with_preprocessor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.preprocessor_path = path.into();
        self
    }

    pub fn with_test_ratio(mut self, test_ratio: f64) -> Self {
        self.test_ratio = test_ratio;
        self
    }

    pub fn with_split_seed(mut self, seed: u64) -> Self {
        self.split_seed = seed;
        self
    }

    pub fn trainer_config(&self) -> &TrainerConfig {
        &self.trainer_config
    }

    pub fn preprocessor_path(&self) -> &Path {
        &self.preprocessor_path
    }

    /// Train the default regressor catalog on a CSV file
    pub fn run(&self, csv_path: impl AsRef<Path>) -> Result<TrainOutcome, PipelineError> {
        let dataset = StudentDataset::from_csv(csv_path)?;
        let catalog = ModelCatalog::default_regressors(self.trainer_config.random_state);
        self.run_dataset(&dataset, &catalog)
    }

    /// Train `catalog` on an already loaded dataset
    pub fn run_dataset(
        &self,
        dataset: &StudentDataset,
        catalog: &ModelCatalog,
    ) -> Result<TrainOutcome, PipelineError> {
        let trainer = ModelTrainer::new(self.trainer_config.clone())?;
        let (train, test) = dataset.train_test_split(self.test_ratio, self.split_seed)?;
        info!(n_train = train.len(), n_test = test.len(), "Split dataset");

        let preprocessor = Preprocessor::fit(train.records())?;
        let x_train = preprocessor.transform(train.records())?;
        let x_test = preprocessor.transform(test.records())?;

        let report = trainer.evaluate(&x_train, train.targets(), &x_test, test.targets(), catalog)?;
        let score = trainer.select_and_persist(&report)?;

        // The deployed model and encoder must stay a pair: only a persisted model
        // replaces the encoder on disk
        preprocessor.save(&self.preprocessor_path)?;
        info!(path = %self.preprocessor_path.display(), "Saved preprocessor");
        let model_name = report
            .best()
            .map(|best| best.name.clone())
            .unwrap_or_default();

        Ok(TrainOutcome {
            model_name,
            score,
            n_train: train.len(),
            n_test: test.len(),
            report,
        })
    }
}
