//! Trainer configuration

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for [`ModelTrainer`](super::ModelTrainer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Where the winning model is written (overwritten on every successful run)
    pub artifact_path: PathBuf,

    /// Minimum test R² the best model must reach before it is persisted
    pub min_score: f64,

    /// Number of cross-validation folds used by the grid search
    pub cv_folds: usize,

    /// Shuffle rows before cutting CV folds
    pub cv_shuffle: bool,

    /// Seed for CV shuffling and for the randomized regressors
    pub random_state: u64,

    /// Evaluate catalog entries on the rayon thread pool
    pub parallel: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("artifacts").join("model.bin"),
            min_score: 0.6,
            cv_folds: 3,
            cv_shuffle: false,
            random_state: 42,
            parallel: false,
        }
    }
}

impl TrainerConfig {
    /// Builder method to set the artifact path
    pub fn with_artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = path.into();
        self
    }

    /// Builder method to set the quality threshold
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Builder method to set CV folds
    pub fn with_cv(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    pub fn with_cv_shuffle(mut self, shuffle: bool) -> Self {
        self.cv_shuffle = shuffle;
        self
    }

    /// Builder method to set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.artifact_path.as_os_str().is_empty() {
            return Err(ModelError::ConfigError("artifact_path is empty".to_string()));
        }
        if self.cv_folds < 2 {
            return Err(ModelError::ConfigError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if !self.min_score.is_finite() {
            return Err(ModelError::ConfigError(format!(
                "min_score must be finite, got {}",
                self.min_score
            )));
        }
        Ok(())
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainerConfig::default();
        assert_eq!(config.artifact_path, Path::new("artifacts/model.bin"));
        assert_eq!(config.min_score, 0.6);
        assert_eq!(config.cv_folds, 3);
        assert!(!config.cv_shuffle);
        assert!(!config.parallel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = TrainerConfig::default()
            .with_artifact_path("/tmp/x.bin")
            .with_min_score(0.8)
            .with_cv(5)
            .with_cv_shuffle(true)
            .with_random_state(7)
            .with_parallel(true);
        assert_eq!(config.min_score, 0.8);
        assert_eq!(config.cv_folds, 5);
        assert!(config.cv_shuffle);
        assert_eq!(config.random_state, 7);
        assert!(config.parallel);
    }

    #[test]
    fn test_validate_rejects_single_fold() {
        assert!(matches!(
            TrainerConfig::default().with_cv(1).validate(),
            Err(ModelError::ConfigError(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let path = std::env::temp_dir().join(format!("mathscore_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "min_score": 0.75, "parallel": true }"#).unwrap();

        let config = TrainerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.min_score, 0.75);
        assert!(config.parallel);
        assert_eq!(config.cv_folds, 3);

        std::fs::remove_file(&path).ok();
    }
}
