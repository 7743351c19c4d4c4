//! AdaBoost (Adaptive Boosting) regression, AdaBoost.R2 variant
//!
//! Each round fits a shallow regression tree on a bootstrap drawn according to the
//! current sample weights, then up-weights the samples it predicted worst.
//! Predictions are the weighted median of the per-tree predictions.

use super::decision_tree::{DecisionTreeConfig, DecisionTreeRegressor};
use super::models::{check_fit_input, check_n_features, Estimator, FittedModel};
use super::params::{expect_float, expect_str, expect_usize, unknown_param, ParamGrid, ParamSet};
use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Per-sample loss used to reweight the training set
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum BoostLoss {
    #[default]
    Linear,
    Square,
    Exponential,
}

impl BoostLoss {
    fn apply(&self, normalized_error: f64) -> f64 {
        match self {
            BoostLoss::Linear => normalized_error,
            BoostLoss::Square => normalized_error * normalized_error,
            BoostLoss::Exponential => 1.0 - (-normalized_error).exp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostConfig {
    /// Maximum number of boosting rounds
    pub n_estimators: usize,
    /// Shrinks each estimator's weight
    pub learning_rate: f64,
    pub loss: BoostLoss,
    /// Depth of the base trees
    pub max_depth: usize,
    pub random_state: Option<u64>,
}

impl Default for AdaBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
            loss: BoostLoss::Linear,
            max_depth: 3,
            random_state: Some(42),
        }
    }
}

impl AdaBoostConfig {
    pub fn with_params(&self, params: &ParamSet) -> Result<Self> {
        let mut config = self.clone();
        for (name, value) in params.iter() {
            match name {
                "learning_rate" => config.learning_rate = expect_float(name, value)?,
                "n_estimators" => config.n_estimators = expect_usize(name, value)?,
                "max_depth" => config.max_depth = expect_usize(name, value)?,
                "loss" => {
                    config.loss = match expect_str(name, value)? {
                        "linear" => BoostLoss::Linear,
                        "square" => BoostLoss::Square,
                        "exponential" => BoostLoss::Exponential,
                        other => {
                            return Err(ModelError::invalid_parameter(
                                name,
                                other,
                                "expected linear, square or exponential",
                            ))
                        }
                    }
                }
                _ => return Err(unknown_param("AdaBoostRegressor", name, value)),
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
        Ok(())
    }
}

impl Estimator for AdaBoostConfig {
    fn hyperparameter_space(&self) -> ParamGrid {
        ParamGrid::new()
            .axis("learning_rate", [0.1, 0.01, 0.05, 0.001])
            .axis("n_estimators", [8usize, 16, 32, 64, 128, 256])
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, params: &ParamSet) -> Result<FittedModel> {
        let mut model = AdaBoostRegressor::new(self.with_params(params)?);
        model.fit(x, y)?;
        Ok(FittedModel::AdaBoostRegressor(model))
    }
}

/// AdaBoost.R2 regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostRegressor {
    config: AdaBoostConfig,
    estimators: Vec<DecisionTreeRegressor>,
    /// Weight of each estimator in the weighted median
    alphas: Vec<f64>,
    n_features: usize,
}

impl AdaBoostRegressor {
    pub fn new(config: AdaBoostConfig) -> Self {
        Self {
            config,
            estimators: Vec::new(),
            alphas: Vec::new(),
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_fit_input(x, y)?;
        self.config.validate()?;

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        self.estimators.clear();
        self.alphas.clear();

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        let lr = self.config.learning_rate;
        let mut weights = vec![1.0 / n_samples as f64; n_samples];

        for round in 0..self.config.n_estimators {
            let sampler = WeightedIndex::new(&weights).map_err(|e| {
                ModelError::ComputationError(format!("invalid sample weights: {}", e))
            })?;
            let boot: Vec<usize> = (0..n_samples).map(|_| sampler.sample(&mut rng)).collect();

            let mut tree = DecisionTreeRegressor::new(DecisionTreeConfig {
                max_depth: Some(self.config.max_depth),
                random_state: self.config.random_state.map(|s| s.wrapping_add(round as u64)),
                ..Default::default()
            });
            tree.fit(&x.select(Axis(0), &boot), &y.select(Axis(0), &boot))?;

            let y_pred = tree.predict(x)?;
            let abs_errors: Vec<f64> = y_pred.iter().zip(y.iter()).map(|(p, t)| (p - t).abs()).collect();
            let max_error = abs_errors.iter().cloned().fold(0.0, f64::max);

            let losses: Vec<f64> = abs_errors
                .iter()
                .map(|&e| {
                    let normalized = if max_error > 0.0 { e / max_error } else { 0.0 };
                    self.config.loss.apply(normalized)
                })
                .collect();
            let estimator_error: f64 = weights.iter().zip(&losses).map(|(w, l)| w * l).sum();

            // A perfect fit ends boosting
            if estimator_error <= 0.0 {
                self.estimators.push(tree);
                self.alphas.push(1.0);
                break;
            }

            // Worse than chance: keep it only if nothing else exists yet
            if estimator_error >= 0.5 {
                if self.estimators.is_empty() {
                    self.estimators.push(tree);
                    self.alphas.push(1.0);
                }
                break;
            }

            let beta = estimator_error / (1.0 - estimator_error);
            self.estimators.push(tree);
            self.alphas.push(lr * (1.0 / beta).ln());

            for (w, l) in weights.iter_mut().zip(&losses) {
                *w *= beta.powf((1.0 - l) * lr);
            }
            let total: f64 = weights.iter().sum();
            if !(total > 0.0) || !total.is_finite() {
                break;
            }
            for w in weights.iter_mut() {
                *w /= total;
            }
        }

        Ok(self)
    }

    /// Weighted median of the estimators' predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.estimators.is_empty() {
            return Err(ModelError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let all_predictions: Vec<Array1<f64>> = self
            .estimators
            .iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;
        let total_weight: f64 = self.alphas.iter().sum();

        Ok((0..x.nrows())
            .map(|i| {
                let mut votes: Vec<(f64, f64)> = all_predictions
                    .iter()
                    .zip(&self.alphas)
                    .map(|(preds, &alpha)| (preds[i], alpha))
                    .collect();
                votes.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
                weighted_median(&votes, total_weight)
            })
            .collect())
    }

    pub fn n_estimators_fitted(&self) -> usize {
        self.estimators.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

/// First value whose cumulative weight reaches half the total; input sorted by value
fn weighted_median(sorted: &[(f64, f64)], total_weight: f64) -> f64 {
    let half = 0.5 * total_weight;
    let mut cumulative = 0.0;
    for &(value, weight) in sorted {
        cumulative += weight;
        if cumulative >= half {
            return value;
        }
    }
    sorted.last().map_or(0.0, |&(value, _)| value)
}
