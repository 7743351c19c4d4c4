//! Student performance dataset loading and splitting

use super::features::StudentRecord;
use crate::error::{ModelError, Result};
use ndarray::Array1;
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::Path;
use tracing::info;

/// Column holding the regression target
pub const TARGET_COLUMN: &str = "math_score";

/// Labelled student records
#[derive(Debug, Clone, PartialEq)]
pub struct StudentDataset {
    records: Vec<StudentRecord>,
    targets: Array1<f64>,
}

impl StudentDataset {
    pub fn new(records: Vec<StudentRecord>, targets: Array1<f64>) -> Result<Self> {
        if records.len() != targets.len() {
            return Err(ModelError::ShapeError {
                expected: format!("{} targets", records.len()),
                actual: format!("{} targets", targets.len()),
            });
        }
        Ok(Self { records, targets })
    }

    /// Read a CSV with a header row
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        info!(
            path = %path.display(),
            rows = df.height(),
            columns = df.width(),
            "Loaded dataset"
        );
        Self::from_dataframe(&df)
    }

    /// Extract records and targets; missing columns or null cells are data errors
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let text = |name: &str| -> Result<Vec<String>> {
            df.column(name)?
                .str()?
                .into_iter()
                .enumerate()
                .map(|(row, v)| v.map(str::to_string).ok_or_else(|| missing_value(name, row)))
                .collect()
        };
        let numeric = |name: &str| -> Result<Vec<f64>> {
            let column = df.column(name)?.cast(&DataType::Float64)?;
            let values = column
                .f64()?
                .into_iter()
                .enumerate()
                .map(|(row, v)| v.ok_or_else(|| missing_value(name, row)))
                .collect();
            values
        };

        let genders = text("gender")?;
        let races = text("race_ethnicity")?;
        let education = text("parental_level_of_education")?;
        let lunch = text("lunch")?;
        let preparation = text("test_preparation_course")?;
        let reading = numeric("reading_score")?;
        let writing = numeric("writing_score")?;
        let targets = numeric(TARGET_COLUMN)?;

        let records = genders
            .into_iter()
            .zip(races)
            .zip(education)
            .zip(lunch)
            .zip(preparation)
            .zip(reading.into_iter().zip(writing))
            .map(
                |(((((gender, race_ethnicity), parental_level_of_education), lunch), test_preparation_course), (reading_score, writing_score))| {
                    StudentRecord {
                        gender,
                        race_ethnicity,
                        parental_level_of_education,
                        lunch,
                        test_preparation_course,
                        reading_score,
                        writing_score,
                    }
                },
            )
            .collect();

        Self::new(records, Array1::from(targets))
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    pub fn targets(&self) -> &Array1<f64> {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Seeded shuffle split into (train, test); the test part has `ceil(test_ratio * n)` rows
    pub fn train_test_split(&self, test_ratio: f64, seed: u64) -> Result<(Self, Self)> {
        if !(test_ratio > 0.0 && test_ratio < 1.0) {
            return Err(ModelError::invalid_parameter(
                "test_ratio",
                test_ratio,
                "must be in (0, 1)",
            ));
        }

        let n = self.len();
        let n_test = (test_ratio * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(ModelError::DataError(format!(
                "cannot split {} records with test_ratio {}",
                n, test_ratio
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let (test_idx, train_idx) = indices.split_at(n_test);
        Ok((self.subset(train_idx), self.subset(test_idx)))
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
        }
    }
}

fn missing_value(column: &str, row: usize) -> ModelError {
    ModelError::DataError(format!("missing value in column '{}' at row {}", column, row))
}
