//! Gradient Boosting implementation
//!
//! Least-squares boosting: each round fits a shallow regression tree to the
//! current residuals on an optional row subsample and adds it with shrinkage.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::decision_tree::{Criterion, DecisionTreeConfig, DecisionTreeRegressor};
use super::models::{check_fit_input, check_n_features, Estimator, FittedModel};
use super::params::{expect_float, expect_usize, unknown_param, ParamGrid, ParamSet};
use crate::error::{ModelError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn without replacement for each tree
    pub subsample: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: Some(42),
        }
    }
}

impl GradientBoostingConfig {
    pub fn with_params(&self, params: &ParamSet) -> Result<Self> {
        let mut config = self.clone();
        for (name, value) in params.iter() {
            match name {
                "learning_rate" => config.learning_rate = expect_float(name, value)?,
                "subsample" => config.subsample = expect_float(name, value)?,
                "n_estimators" => config.n_estimators = expect_usize(name, value)?,
                "max_depth" => config.max_depth = expect_usize(name, value)?,
                "min_samples_leaf" => config.min_samples_leaf = expect_usize(name, value)?,
                _ => return Err(unknown_param("GradientBoostingRegressor", name, value)),
            }
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ModelError::invalid_parameter("n_estimators", 0, "must be at least 1"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ModelError::invalid_parameter(
                "learning_rate",
                self.learning_rate,
                "must be positive",
            ));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ModelError::invalid_parameter(
                "subsample",
                self.subsample,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

impl Estimator for GradientBoostingConfig {
    fn hyperparameter_space(&self) -> ParamGrid {
        ParamGrid::new()
            .axis("learning_rate", [0.1, 0.01, 0.05, 0.001])
            .axis("subsample", [0.6, 0.7, 0.75, 0.8, 0.85, 0.9])
            .axis("n_estimators", [8usize, 16, 32, 64, 128, 256])
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, params: &ParamSet) -> Result<FittedModel> {
        let mut model = GradientBoostingRegressor::new(self.with_params(params)?);
        model.fit(x, y)?;
        Ok(FittedModel::GradientBoostingRegressor(model))
    }
}

/// Gradient Boosting Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTreeRegressor>,
    initial_prediction: f64,
    n_features: usize,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_prediction: 0.0,
            n_features: 0,
        }
    }

    /// Fit the gradient boosting model
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.config.validate()?;

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        self.trees.clear();

        // Initialize with mean
        self.initial_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        for round in 0..self.config.n_estimators {
            let residuals = y - &predictions;

            let sample_indices = self.subsample_indices(n_samples, &mut rng);
            let x_sub = x.select(Axis(0), &sample_indices);
            let r_sub = residuals.select(Axis(0), &sample_indices);

            let mut tree = DecisionTreeRegressor::new(DecisionTreeConfig {
                criterion: Criterion::FriedmanMse,
                max_depth: Some(self.config.max_depth),
                min_samples_split: 2,
                min_samples_leaf: self.config.min_samples_leaf,
                max_features: None,
                random_state: self.config.random_state.map(|s| s.wrapping_add(round as u64)),
            });
            tree.fit(&x_sub, &r_sub)?;

            // Every row moves, not just the subsample the tree was grown on
            predictions.scaled_add(self.config.learning_rate, &tree.predict(x)?);
            self.trees.push(tree);
        }

        Ok(())
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ModelError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for tree in &self.trees {
            predictions.scaled_add(self.config.learning_rate, &tree.predict(x)?);
        }

        Ok(predictions)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        if self.config.subsample >= 1.0 {
            return indices;
        }
        let sample_size = (((n as f64) * self.config.subsample).ceil() as usize).clamp(1, n);
        indices.shuffle(rng);
        indices.truncate(sample_size);
        indices.sort_unstable();
        indices
    }
}
