//! Scoring new students with a persisted model

use super::features::{n_encoded_features, Preprocessor, StudentRecord};
use crate::error::{ModelError, Result};
use crate::export::ModelArtifact;
use ndarray::Array1;
use std::path::Path;
use tracing::debug;

/// A loaded model artifact together with the preprocessor it was trained behind
#[derive(Debug, Clone)]
pub struct PredictPipeline {
    artifact: ModelArtifact,
    preprocessor: Preprocessor,
}

impl PredictPipeline {
    pub fn new(artifact: ModelArtifact, preprocessor: Preprocessor) -> Result<Self> {
        let expected = n_encoded_features();
        if artifact.n_features != expected {
            return Err(ModelError::ShapeError {
                expected: format!("model over {} encoded features", expected),
                actual: format!("model over {} features", artifact.n_features),
            });
        }
        Ok(Self {
            artifact,
            preprocessor,
        })
    }

    pub fn load(model_path: impl AsRef<Path>, preprocessor_path: impl AsRef<Path>) -> Result<Self> {
        let artifact = ModelArtifact::load(model_path)?;
        let preprocessor = Preprocessor::load(preprocessor_path)?;
        debug!(
            model = %artifact.model_name,
            kind = artifact.model.kind(),
            score = artifact.score,
            "Loaded prediction pipeline"
        );
        Self::new(artifact, preprocessor)
    }

    pub fn model_name(&self) -> &str {
        &self.artifact.model_name
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Predicted math score per record
    pub fn predict(&self, records: &[StudentRecord]) -> Result<Array1<f64>> {
        if records.is_empty() {
            return Ok(Array1::zeros(0));
        }
        let x = self.preprocessor.transform(records)?;
        self.artifact.predict(&x)
    }
}
