//! Persisted winning model
//!
//! Artifacts are bincode-encoded. Encoding is deterministic: the same fitted
//! model always produces the same bytes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::{ModelError, Result};
use crate::training::models::FittedModel;
use crate::training::params::ParamSet;
use ndarray::{Array1, Array2};

/// Bumped whenever the encoded layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// A selected, fitted model plus what is needed to use it safely
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    /// Catalog name of the winning algorithm
    pub model_name: String,
    /// Hyperparameters chosen by the search
    pub params: ParamSet,
    /// Held-out test score at selection time
    pub score: f64,
    /// Feature columns expected by `predict`
    pub n_features: usize,
    pub model: FittedModel,
}

impl ModelArtifact {
    pub fn new(model_name: impl Into<String>, params: ParamSet, score: f64, model: FittedModel) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            model_name: model_name.into(),
            params,
            score,
            n_features: model.n_features(),
            model,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Write to `path`, creating parent directories and replacing any previous artifact
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_atomic(path.as_ref(), &self.to_bytes()?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let artifact: Self = read_bincode(path.as_ref())?;
        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ModelError::SerializationError(format!(
                "unsupported artifact format version {} (expected {})",
                artifact.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        Ok(artifact)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(ModelError::ShapeError {
                expected: format!("{} feature columns", self.n_features),
                actual: format!("{} feature columns", x.ncols()),
            });
        }
        self.model.predict(x)
    }
}

/// Write `bytes` to a sibling temp file and rename it over `path`, so readers
/// never observe a half-written file
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| ModelError::ConfigError(format!("not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(format!(".tmp{}", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();

    if let Err(e) = result {
        fs::remove_file(&tmp_path).ok();
        return Err(e);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        fs::remove_file(&tmp_path).ok();
        ModelError::IoError(e)
    })
}

pub(crate) fn read_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    Ok(bincode::deserialize(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::linear_models::LinearRegression;
    use ndarray::array;

    fn fitted() -> FittedModel {
        let mut model = LinearRegression::default();
        model
            .fit(&array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]], &array![1.0, 2.0, 5.0])
            .unwrap();
        FittedModel::LinearRegression(model)
    }

    #[test]
    fn test_save_load_predict() {
        let dir = std::env::temp_dir().join(format!("mathscore_artifact_{}", std::process::id()));
        let path = dir.join("nested").join("model.bin");

        let artifact = ModelArtifact::new("Linear Regression", ParamSet::new(), 0.9, fitted());
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.model_name, "Linear Regression");
        assert_eq!(loaded.n_features, 2);
        assert_eq!(loaded.score, 0.9);

        let x = array![[3.0, 3.0], [0.5, 0.5]];
        assert_eq!(loaded.predict(&x).unwrap(), artifact.predict(&x).unwrap());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = ModelArtifact::new("Linear Regression", ParamSet::new(), 0.9, fitted());
        let b = ModelArtifact::new("Linear Regression", ParamSet::new(), 0.9, fitted());
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn test_predict_checks_width() {
        let artifact = ModelArtifact::new("Linear Regression", ParamSet::new(), 0.9, fitted());
        assert!(matches!(
            artifact.predict(&array![[1.0]]),
            Err(ModelError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("mathscore_does_not_exist.bin");
        assert!(matches!(ModelArtifact::load(&path), Err(ModelError::IoError(_))));
    }
}
