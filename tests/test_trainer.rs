//! Integration test: catalog evaluation, selection and artifact persistence

use mathscore::error::{ModelError, Result, TrainerError};
use mathscore::export::ModelArtifact;
use mathscore::training::{
    Estimator, FittedModel, KNNConfig, LinearRegressionConfig, ModelCatalog, ModelTrainer,
    ParamGrid, ParamSet, RandomForestConfig, TrainerConfig,
};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;

/// Fits a real linear model but reports a fixed score
#[derive(Debug)]
struct FixedScore {
    score: f64,
    grid: ParamGrid,
}

impl Estimator for FixedScore {
    fn hyperparameter_space(&self) -> ParamGrid {
        self.grid.clone()
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, _params: &ParamSet) -> Result<FittedModel> {
        LinearRegressionConfig::default().fit(x, y, &ParamSet::new())
    }

    fn score(&self, _model: &FittedModel, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<f64> {
        Ok(self.score)
    }
}

#[derive(Debug)]
struct Broken;

impl Estimator for Broken {
    fn hyperparameter_space(&self) -> ParamGrid {
        ParamGrid::new()
    }

    fn fit(&self, _x: &Array2<f64>, _y: &Array1<f64>, _params: &ParamSet) -> Result<FittedModel> {
        Err(ModelError::ComputationError("solver diverged".to_string()))
    }
}

fn fixed(score: f64) -> FixedScore {
    FixedScore {
        score,
        grid: ParamGrid::new(),
    }
}

fn fixed_with_grid(score: f64) -> FixedScore {
    FixedScore {
        score,
        grid: ParamGrid::new().axis("alpha", vec![0.1, 1.0]),
    }
}

/// Linear target in [0, 100] with small noise
fn scores_data(n_rows: usize, n_features: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen_range(0.0..10.0));
    let y = x
        .rows()
        .into_iter()
        .map(|row| {
            let signal: f64 = row.iter().enumerate().map(|(j, v)| v * (1.0 + 0.1 * j as f64)).sum();
            (5.0 + signal + rng.gen_range(-1.0..1.0)).clamp(0.0, 100.0)
        })
        .collect();
    (x, y)
}

fn artifact_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("mathscore_trainer_{}_{}", name, std::process::id()))
        .join("model.bin")
}

fn cleanup(path: &PathBuf) {
    if let Some(dir) = path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

#[test]
fn test_report_keys_match_catalog() {
    let (x_train, y_train) = scores_data(120, 3, 1);
    let (x_test, y_test) = scores_data(30, 3, 2);
    let catalog = ModelCatalog::new()
        .with_estimator("Linear Regression", LinearRegressionConfig::default())
        .and_then(|c| c.with_estimator("K-Neighbor Regressor", KNNConfig::default()))
        .unwrap();

    let trainer = ModelTrainer::new(TrainerConfig::default().with_artifact_path(artifact_path("keys"))).unwrap();
    let report = trainer.evaluate(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap();

    assert_eq!(report.names(), catalog.names());
    let linear = report.get("Linear Regression").unwrap();
    assert!(linear.score > 0.95, "linear R² = {}", linear.score);
    assert!(linear.cv_score.is_none());
    assert!(report.get("K-Neighbor Regressor").unwrap().cv_score.is_some());
}

#[test]
fn test_linear_entry_selected_over_weaker_grid_entry() {
    let (x_train, y_train) = scores_data(800, 7, 3);
    let (x_test, y_test) = scores_data(200, 7, 4);
    let path = artifact_path("select");

    let catalog = ModelCatalog::new()
        .with_estimator("Linear Regression", fixed(0.81))
        .and_then(|c| c.with_estimator("Weak", fixed_with_grid(0.45)))
        .unwrap();
    let trainer = ModelTrainer::new(TrainerConfig::default().with_artifact_path(&path)).unwrap();

    let score = trainer.train(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap();
    assert_eq!(score, 0.81);

    let artifact = ModelArtifact::load(&path).unwrap();
    assert_eq!(artifact.model_name, "Linear Regression");
    assert_eq!(artifact.score, 0.81);
    assert_eq!(artifact.predict(&x_test).unwrap().len(), x_test.nrows());

    cleanup(&path);
}

#[test]
fn test_below_threshold_writes_nothing() {
    let (x_train, y_train) = scores_data(100, 4, 5);
    let (x_test, y_test) = scores_data(25, 4, 6);
    let path = artifact_path("threshold");

    let catalog = ModelCatalog::new()
        .with_estimator("A", fixed(0.3))
        .and_then(|c| c.with_estimator("B", fixed_with_grid(0.5)))
        .unwrap();
    let trainer = ModelTrainer::new(TrainerConfig::default().with_artifact_path(&path)).unwrap();

    let err = trainer.train(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap_err();
    match err {
        TrainerError::QualityThreshold {
            best_model,
            best_score,
            threshold,
        } => {
            assert_eq!(best_model.as_deref(), Some("B"));
            assert_eq!(best_score, 0.5);
            assert_eq!(threshold, 0.6);
        }
        other => panic!("expected QualityThreshold, got {:?}", other),
    }
    assert!(!path.exists());
}

#[test]
fn test_score_equal_to_threshold_is_persisted() {
    let (x_train, y_train) = scores_data(60, 2, 19);
    let (x_test, y_test) = scores_data(20, 2, 20);
    let path = artifact_path("boundary");
    let trainer = ModelTrainer::new(TrainerConfig::default().with_artifact_path(&path)).unwrap();

    let catalog = ModelCatalog::new().with_estimator("Exact", fixed(0.6)).unwrap();
    let score = trainer.train(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap();
    assert_eq!(score, 0.6);
    assert!(path.exists());
    assert_eq!(ModelArtifact::load(&path).unwrap().model_name, "Exact");

    cleanup(&path);
}

#[test]
fn test_score_just_below_threshold_is_rejected() {
    let (x_train, y_train) = scores_data(60, 2, 21);
    let (x_test, y_test) = scores_data(20, 2, 22);
    let path = artifact_path("below_boundary");
    let trainer = ModelTrainer::new(TrainerConfig::default().with_artifact_path(&path)).unwrap();

    let catalog = ModelCatalog::new()
        .with_estimator("Almost", fixed(0.6 - 1e-9))
        .unwrap();
    let err = trainer.train(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap_err();
    assert!(matches!(err, TrainerError::QualityThreshold { .. }));
    assert_eq!(err.algorithm(), Some("Almost"));
    assert!(!path.exists());
}

#[test]
fn test_invalid_config_is_trainer_error() {
    let err = ModelTrainer::new(TrainerConfig::default().with_cv(0)).unwrap_err();
    assert!(matches!(err, TrainerError::Config(ModelError::ConfigError(_))));
    assert_eq!(err.algorithm(), None);
}

#[test]
fn test_threshold_failure_keeps_previous_artifact() {
    let (x_train, y_train) = scores_data(100, 2, 7);
    let (x_test, y_test) = scores_data(25, 2, 8);
    let path = artifact_path("keep");
    let trainer = ModelTrainer::new(TrainerConfig::default().with_artifact_path(&path)).unwrap();

    let good = ModelCatalog::new().with_estimator("Good", fixed(0.9)).unwrap();
    trainer.train(&x_train, &y_train, &x_test, &y_test, &good).unwrap();
    let before = std::fs::read(&path).unwrap();

    let bad = ModelCatalog::new().with_estimator("Bad", fixed(0.1)).unwrap();
    assert!(trainer.train(&x_train, &y_train, &x_test, &y_test, &bad).is_err());
    assert_eq!(std::fs::read(&path).unwrap(), before);

    cleanup(&path);
}

#[test]
fn test_tie_goes_to_earliest_entry() {
    let (x_train, y_train) = scores_data(60, 2, 9);
    let (x_test, y_test) = scores_data(20, 2, 10);
    let path = artifact_path("tie");

    let catalog = ModelCatalog::new()
        .with_estimator("First", fixed(0.7))
        .and_then(|c| c.with_estimator("Second", fixed(0.9)))
        .and_then(|c| c.with_estimator("Third", fixed(0.9)))
        .unwrap();

    for parallel in [false, true] {
        let trainer = ModelTrainer::new(
            TrainerConfig::default()
                .with_artifact_path(&path)
                .with_parallel(parallel),
        )
        .unwrap();
        let report = trainer.evaluate(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap();
        assert_eq!(report.names(), vec!["First", "Second", "Third"]);

        trainer.select_and_persist(&report).unwrap();
        assert_eq!(ModelArtifact::load(&path).unwrap().model_name, "Second");
    }

    cleanup(&path);
}

#[test]
fn test_persist_is_byte_identical() {
    let (x_train, y_train) = scores_data(80, 3, 11);
    let (x_test, y_test) = scores_data(20, 3, 12);
    let path = artifact_path("idempotent");

    let catalog = ModelCatalog::new()
        .with_estimator("Random Forest Regressor", RandomForestConfig::default().with_random_state(42))
        .unwrap();
    let trainer = ModelTrainer::new(
        TrainerConfig::default()
            .with_artifact_path(&path)
            .with_min_score(0.0),
    )
    .unwrap();

    let report = trainer.evaluate(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap();
    trainer.select_and_persist(&report).unwrap();
    let first = std::fs::read(&path).unwrap();
    trainer.select_and_persist(&report).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);

    // a fresh search with the same seeds produces the same bytes too
    let again = trainer.evaluate(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap();
    trainer.select_and_persist(&again).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);

    cleanup(&path);
}

#[test]
fn test_estimator_failure_is_wrapped() {
    let (x_train, y_train) = scores_data(40, 2, 13);
    let (x_test, y_test) = scores_data(10, 2, 14);
    let path = artifact_path("broken");

    let catalog = ModelCatalog::new()
        .with_estimator("Good", fixed(0.9))
        .and_then(|c| c.with_estimator("Broken", Broken))
        .unwrap();
    let trainer = ModelTrainer::new(TrainerConfig::default().with_artifact_path(&path)).unwrap();

    let err = trainer.train(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap_err();
    assert_eq!(err.algorithm(), Some("Broken"));
    assert!(matches!(
        err,
        TrainerError::Training {
            source: ModelError::ComputationError(_),
            ..
        }
    ));
    assert!(!path.exists());
}

#[test]
fn test_mismatched_columns_are_training_errors() {
    let (x_train, y_train) = scores_data(40, 3, 15);
    let (x_test, y_test) = scores_data(10, 2, 16);
    let catalog = ModelCatalog::new()
        .with_estimator("Linear Regression", LinearRegressionConfig::default())
        .unwrap();
    let trainer = ModelTrainer::new(TrainerConfig::default().with_artifact_path(artifact_path("shape"))).unwrap();

    let err = trainer.evaluate(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap_err();
    assert_eq!(err.algorithm(), Some("Linear Regression"));
    assert!(matches!(
        err,
        TrainerError::Training {
            source: ModelError::ShapeError { .. },
            ..
        }
    ));
}

#[test]
fn test_default_catalog_end_to_end() {
    let (x_train, y_train) = scores_data(60, 2, 17);
    let (x_test, y_test) = scores_data(20, 2, 18);
    let path = artifact_path("default");

    let catalog = ModelCatalog::default_regressors(42);
    let trainer = ModelTrainer::new(
        TrainerConfig::default()
            .with_artifact_path(&path)
            .with_cv_shuffle(true)
            .with_parallel(true),
    )
    .unwrap();

    let report = trainer.evaluate(&x_train, &y_train, &x_test, &y_test, &catalog).unwrap();
    assert_eq!(report.names(), catalog.names());
    assert!(report.evaluations().iter().all(|e| e.score.is_finite()));

    let best = report.best().unwrap();
    let score = trainer.select_and_persist(&report).unwrap();
    assert_eq!(score, best.score);
    assert!(report.evaluations().iter().all(|e| e.score <= score));

    let artifact = ModelArtifact::load(&path).unwrap();
    assert_eq!(artifact.model_name, best.name);
    assert_eq!(artifact.predict(&x_test).unwrap().len(), 20);

    cleanup(&path);
}
