//! Model selection across the catalog
//!
//! [`ModelTrainer::evaluate`] grid-searches every catalog entry and scores the refit
//! model on the held-out test set. [`ModelTrainer::select_and_persist`] keeps the
//! single best model, enforces the quality threshold and writes the artifact.

use super::catalog::{CatalogEntry, ModelCatalog};
use super::config::TrainerConfig;
use super::cross_validation::KFold;
use super::grid_search::GridSearch;
use super::models::{FittedModel, ModelMetrics};
use super::params::ParamSet;
use crate::error::{ModelError, Result, TrainerError};
use crate::export::ModelArtifact;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of searching one catalog entry
#[derive(Debug, Clone)]
pub struct ModelEvaluation {
    /// Catalog name
    pub name: String,
    /// R² of the refit model on the test set
    pub score: f64,
    pub best_params: ParamSet,
    /// Mean CV R² of the winning candidate (None for single-candidate grids)
    pub cv_score: Option<f64>,
    /// Model refit on the full training set with `best_params`
    pub model: FittedModel,
    /// Error metrics of `model` on the test set
    pub metrics: ModelMetrics,
}

/// One evaluation per catalog entry, in catalog order
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    evaluations: Vec<ModelEvaluation>,
}

impl EvaluationReport {
    pub fn new(evaluations: Vec<ModelEvaluation>) -> Self {
        Self { evaluations }
    }

    pub fn evaluations(&self) -> &[ModelEvaluation] {
        &self.evaluations
    }

    pub fn get(&self, name: &str) -> Option<&ModelEvaluation> {
        self.evaluations.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.evaluations.iter().map(|e| e.name.as_str()).collect()
    }

    /// (name, test score) pairs in catalog order
    pub fn scores(&self) -> Vec<(&str, f64)> {
        self.evaluations
            .iter()
            .map(|e| (e.name.as_str(), e.score))
            .collect()
    }

    /// The highest-scoring evaluation; the earliest entry wins ties and NaN scores never win
    pub fn best(&self) -> Option<&ModelEvaluation> {
        let mut best: Option<&ModelEvaluation> = None;
        for evaluation in &self.evaluations {
            if evaluation.score.is_nan() {
                continue;
            }
            if best.map_or(true, |b| evaluation.score > b.score) {
                best = Some(evaluation);
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.evaluations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluations.is_empty()
    }
}

/// Searches, selects and persists the best regressor of a catalog
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: TrainerConfig,
}

impl ModelTrainer {
    /// Fails with [`TrainerError::Config`] when `config` does not validate
    pub fn new(config: TrainerConfig) -> std::result::Result<Self, TrainerError> {
        config.validate().map_err(TrainerError::Config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Search every catalog entry and score its refit model on the test set.
    ///
    /// Any failure aborts the run as [`TrainerError::Training`] naming the entry.
    /// In parallel mode the reported failure is one of the failing entries, not
    /// necessarily the earliest.
    pub fn evaluate(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
        catalog: &ModelCatalog,
    ) -> std::result::Result<EvaluationReport, TrainerError> {
        info!(
            n_models = catalog.len(),
            n_train = x_train.nrows(),
            n_test = x_test.nrows(),
            n_features = x_train.ncols(),
            parallel = self.config.parallel,
            "Evaluating model catalog"
        );

        let evaluate = |entry: &CatalogEntry| {
            self.evaluate_entry(entry, x_train, y_train, x_test, y_test)
                .map_err(|e| TrainerError::training(entry.name.as_str(), e))
        };

        // One result slot per entry; collect keeps catalog order in both modes
        let evaluations = if self.config.parallel {
            catalog
                .entries()
                .par_iter()
                .map(evaluate)
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            catalog
                .entries()
                .iter()
                .map(evaluate)
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        Ok(EvaluationReport::new(evaluations))
    }

    fn evaluate_entry(
        &self,
        entry: &CatalogEntry,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<ModelEvaluation> {
        check_split(x_train, y_train, x_test, y_test)?;

        let start = Instant::now();
        debug!(
            algorithm = %entry.name,
            grid = %entry.grid,
            n_candidates = entry.grid.n_candidates(),
            "Starting hyperparameter search"
        );

        let mut cv = KFold::new(self.config.cv_folds);
        if self.config.cv_shuffle {
            cv = cv.with_shuffle(self.config.random_state);
        }

        let search = GridSearch::new(entry.estimator.as_ref(), &entry.grid, cv).run(x_train, y_train)?;
        let score = entry.estimator.score(&search.model, x_test, y_test)?;
        let metrics = ModelMetrics::compute_regression(y_test, &search.model.predict(x_test)?)?;

        info!(
            algorithm = %entry.name,
            score,
            cv_score = ?search.best_cv_score,
            rmse = metrics.rmse,
            params = %search.best_params,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Evaluated model"
        );

        Ok(ModelEvaluation {
            name: entry.name.clone(),
            score,
            best_params: search.best_params,
            cv_score: search.best_cv_score,
            model: search.model,
            metrics,
        })
    }

    /// Persist the best model of `report` and return its score.
    ///
    /// Fails with [`TrainerError::QualityThreshold`] (nothing written) when the best
    /// score is below `min_score`.
    pub fn select_and_persist(&self, report: &EvaluationReport) -> std::result::Result<f64, TrainerError> {
        let threshold = self.config.min_score;

        let best = match report.best() {
            Some(best) if best.score >= threshold => best,
            best => {
                let err = TrainerError::QualityThreshold {
                    best_model: best.map(|b| b.name.clone()),
                    best_score: best.map_or(f64::NEG_INFINITY, |b| b.score),
                    threshold,
                };
                warn!(error = %err, "No model is good enough to persist");
                return Err(err);
            }
        };

        let artifact = ModelArtifact::new(
            best.name.as_str(),
            best.best_params.clone(),
            best.score,
            best.model.clone(),
        );
        artifact
            .save(&self.config.artifact_path)
            .map_err(|e| TrainerError::training(best.name.as_str(), e))?;

        info!(
            model = %best.name,
            score = best.score,
            path = %self.config.artifact_path.display(),
            "Persisted best model"
        );

        Ok(best.score)
    }

    /// Evaluate the catalog, then select and persist the winner
    pub fn train(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
        catalog: &ModelCatalog,
    ) -> std::result::Result<f64, TrainerError> {
        let report = self.evaluate(x_train, y_train, x_test, y_test, catalog)?;
        self.select_and_persist(&report)
    }
}

/// Shape checks shared by every entry: non-empty sets, one label per row, same columns
fn check_split(
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
) -> Result<()> {
    for (what, x, y) in [("train", x_train, y_train), ("test", x_test, y_test)] {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ModelError::ValidationError(format!(
                "{} matrix is empty ({} x {})",
                what,
                x.nrows(),
                x.ncols()
            )));
        }
        if x.nrows() != y.len() {
            return Err(ModelError::ShapeError {
                expected: format!("{} {} labels", x.nrows(), what),
                actual: format!("{} labels", y.len()),
            });
        }
    }
    if x_train.ncols() != x_test.ncols() {
        return Err(ModelError::ShapeError {
            expected: format!("{} test feature columns", x_train.ncols()),
            actual: format!("{} test feature columns", x_test.ncols()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::linear_models::LinearRegression;
    use ndarray::array;

    fn evaluation(name: &str, score: f64) -> ModelEvaluation {
        let mut model = LinearRegression::default();
        model.fit(&array![[0.0], [1.0], [2.0]], &array![0.0, 1.0, 2.0]).unwrap();
        ModelEvaluation {
            name: name.to_string(),
            score,
            best_params: ParamSet::new(),
            cv_score: None,
            model: FittedModel::LinearRegression(model),
            metrics: ModelMetrics::default(),
        }
    }

    #[test]
    fn test_best_prefers_first_on_tie() {
        let report = EvaluationReport::new(vec![
            evaluation("a", 0.7),
            evaluation("b", 0.9),
            evaluation("c", 0.9),
        ]);
        assert_eq!(report.best().unwrap().name, "b");
    }

    #[test]
    fn test_best_skips_nan() {
        let report = EvaluationReport::new(vec![evaluation("a", f64::NAN), evaluation("b", -1.0)]);
        assert_eq!(report.best().unwrap().name, "b");
        assert!(EvaluationReport::default().best().is_none());
    }

    #[test]
    fn test_empty_report_fails_threshold() {
        let path = std::env::temp_dir().join(format!("mathscore_empty_{}.bin", std::process::id()));
        let trainer = ModelTrainer::new(TrainerConfig::default().with_artifact_path(&path)).unwrap();

        let err = trainer.select_and_persist(&EvaluationReport::default()).unwrap_err();
        assert!(matches!(
            err,
            TrainerError::QualityThreshold { best_model: None, .. }
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_check_split_column_mismatch() {
        let err = check_split(
            &array![[1.0, 2.0]],
            &array![1.0],
            &array![[1.0]],
            &array![1.0],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::ShapeError { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            ModelTrainer::new(TrainerConfig::default().with_cv(0)),
            Err(TrainerError::Config(_))
        ));
    }
}
