//! Student records and the fitted feature transform
//!
//! The design matrix layout is fixed: the two numeric scores first, each divided
//! by its training standard deviation, then the one-hot encoded categories with
//! the first level of every vocabulary dropped.

use crate::error::{ModelError, Result};
use crate::export::{read_bincode, write_atomic};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const GENDERS: &[&str] = &["female", "male"];
pub const RACE_ETHNICITIES: &[&str] = &["group A", "group B", "group C", "group D", "group E"];
pub const PARENTAL_EDUCATION: &[&str] = &[
    "associate's degree",
    "bachelor's degree",
    "high school",
    "master's degree",
    "some college",
    "some high school",
];
pub const LUNCH: &[&str] = &["free/reduced", "standard"];
pub const TEST_PREPARATION: &[&str] = &["completed", "none"];

/// Categorical columns with their sorted vocabularies, in encoding order
pub const CATEGORICAL_COLUMNS: &[(&str, &[&str])] = &[
    ("gender", GENDERS),
    ("race_ethnicity", RACE_ETHNICITIES),
    ("parental_level_of_education", PARENTAL_EDUCATION),
    ("lunch", LUNCH),
    ("test_preparation_course", TEST_PREPARATION),
];

pub const NUMERIC_COLUMNS: &[&str] = &["reading_score", "writing_score"];

/// One student as entered in the prediction form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub gender: String,
    pub race_ethnicity: String,
    pub parental_level_of_education: String,
    pub lunch: String,
    pub test_preparation_course: String,
    pub reading_score: f64,
    pub writing_score: f64,
}

impl StudentRecord {
    fn categories(&self) -> [&str; 5] {
        [
            &self.gender,
            &self.race_ethnicity,
            &self.parental_level_of_education,
            &self.lunch,
            &self.test_preparation_course,
        ]
    }

    fn numerics(&self) -> [f64; 2] {
        [self.reading_score, self.writing_score]
    }
}

/// Number of columns produced by [`Preprocessor::transform`]
pub fn n_encoded_features() -> usize {
    NUMERIC_COLUMNS.len()
        + CATEGORICAL_COLUMNS
            .iter()
            .map(|(_, vocab)| vocab.len() - 1)
            .sum::<usize>()
}

/// Fitted feature transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Divisor per numeric column (population std, 1.0 for constant columns)
    scales: Vec<f64>,
}

impl Preprocessor {
    /// Fit the numeric scales on training records
    pub fn fit(records: &[StudentRecord]) -> Result<Self> {
        if records.is_empty() {
            return Err(ModelError::DataError(
                "cannot fit preprocessor on zero records".to_string(),
            ));
        }

        let n = records.len() as f64;
        let scales = (0..NUMERIC_COLUMNS.len())
            .map(|col| {
                let values = records.iter().map(|r| r.numerics()[col]);
                let mean = values.clone().sum::<f64>() / n;
                let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std > f64::EPSILON && std.is_finite() {
                    std
                } else {
                    1.0
                }
            })
            .collect::<Vec<_>>();

        debug!(?scales, n_records = records.len(), "Fitted preprocessor");
        Ok(Self { scales })
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Encode records into a design matrix
    pub fn transform(&self, records: &[StudentRecord]) -> Result<Array2<f64>> {
        let n_features = n_encoded_features();
        let mut x = Array2::zeros((records.len(), n_features));

        for (i, record) in records.iter().enumerate() {
            for (j, (value, scale)) in record.numerics().iter().zip(&self.scales).enumerate() {
                if !value.is_finite() {
                    return Err(ModelError::InvalidInput(format!(
                        "{} must be a finite number, got {}",
                        NUMERIC_COLUMNS[j], value
                    )));
                }
                x[[i, j]] = value / scale;
            }

            let mut offset = NUMERIC_COLUMNS.len();
            for ((column, vocab), value) in CATEGORICAL_COLUMNS.iter().zip(record.categories()) {
                let level = vocab.iter().position(|v| *v == value).ok_or_else(|| {
                    ModelError::InvalidInput(format!(
                        "unknown {} category '{}' (expected one of: {})",
                        column,
                        value,
                        vocab.join(", ")
                    ))
                })?;
                if level > 0 {
                    x[[i, offset + level - 1]] = 1.0;
                }
                offset += vocab.len() - 1;
            }
        }

        Ok(x)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_atomic(path.as_ref(), &bincode::serialize(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let preprocessor: Self = read_bincode(path.as_ref())?;
        if preprocessor.scales.len() != NUMERIC_COLUMNS.len() {
            return Err(ModelError::SerializationError(format!(
                "preprocessor has {} numeric scales, expected {}",
                preprocessor.scales.len(),
                NUMERIC_COLUMNS.len()
            )));
        }
        Ok(preprocessor)
    }
}
