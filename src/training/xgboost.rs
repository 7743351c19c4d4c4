//! XGBoost-style gradient boosting with second-order approximation
//!
//! Key differences from standard gradient boosting:
//! - Uses both gradient (first derivative) and hessian (second derivative) of loss
//! - Regularized leaf weights: w* = -G / (H + lambda)
//! - Gain-based split scoring: Gain = 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)] - γ
//! - Built-in L1 (alpha) and L2 (lambda) regularization
//! - Minimum child weight constraint

use super::models::{check_fit_input, check_n_features, Estimator, FittedModel};
use super::params::{expect_float, expect_usize, unknown_param, ParamGrid, ParamSet};
use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// XGBoost configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split (gamma)
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: Option<u64>,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: Some(42),
        }
    }
}

impl XGBoostConfig {
    pub fn with_params(&self, params: &ParamSet) -> Result<Self> {
        let mut config = self.clone();
        for (name, value) in params.iter() {
            match name {
                "learning_rate" => config.learning_rate = expect_float(name, value)?,
                "n_estimators" => config.n_estimators = expect_usize(name, value)?,
                "max_depth" => config.max_depth = expect_usize(name, value)?,
                "min_child_weight" => config.min_child_weight = expect_float(name, value)?,
                "reg_lambda" => config.reg_lambda = expect_float(name, value)?,
                "reg_alpha" => config.reg_alpha = expect_float(name, value)?,
                "gamma" => config.gamma = expect_float(name, value)?,
                "subsample" => config.subsample = expect_float(name, value)?,
                "colsample_bytree" => config.colsample_bytree = expect_float(name, value)?,
                _ => return Err(unknown_param("XGBoostRegressor", name, value)),
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
        for (name, ratio) in [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ModelError::invalid_parameter(name, ratio, "must be in (0, 1]"));
            }
        }
        if self.reg_lambda < 0.0 || self.reg_alpha < 0.0 || self.gamma < 0.0 {
            return Err(ModelError::InvalidParameter {
                name: "reg_lambda/reg_alpha/gamma".to_string(),
                value: format!("{}/{}/{}", self.reg_lambda, self.reg_alpha, self.gamma),
                reason: "regularization terms must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

impl Estimator for XGBoostConfig {
    fn hyperparameter_space(&self) -> ParamGrid {
        ParamGrid::new()
            .axis("learning_rate", [0.1, 0.01, 0.05, 0.001])
            .axis("n_estimators", [8usize, 16, 32, 64, 128, 256])
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, params: &ParamSet) -> Result<FittedModel> {
        let mut model = XGBoostRegressor::new(self.with_params(params)?);
        model.fit(x, y)?;
        Ok(FittedModel::XGBoostRegressor(model))
    }
}

/// A single node in the XGBoost tree
#[derive(Debug, Clone, Serialize, Deserialize)]
enum XGBNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<XGBNode>,
        right: Box<XGBNode>,
    },
}

impl XGBNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                XGBNode::Leaf { weight } => return *weight,
                XGBNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Gradient statistics shared by every node of one boosting round
struct GradientPair<'a> {
    grad: &'a Array1<f64>,
    hess: &'a Array1<f64>,
}

/// Build an XGBoost tree using exact greedy split finding
fn build_xgb_tree(
    x: &Array2<f64>,
    stats: &GradientPair<'_>,
    indices: &[usize],
    feature_indices: &[usize],
    depth: usize,
    config: &XGBoostConfig,
) -> XGBNode {
    let n = indices.len();

    // Compute leaf weight with L1/L2 regularization
    let g_sum: f64 = indices.iter().map(|&i| stats.grad[i]).sum();
    let h_sum: f64 = indices.iter().map(|&i| stats.hess[i]).sum();

    let leaf_weight = compute_leaf_weight(g_sum, h_sum, config.reg_lambda, config.reg_alpha);

    // Stopping conditions
    if depth >= config.max_depth || n < 2 || h_sum < config.min_child_weight {
        return XGBNode::Leaf { weight: leaf_weight };
    }

    // Per-feature candidates are computed in parallel, then reduced in feature order
    let best_split = feature_indices
        .par_iter()
        .map(|&f| find_best_split_for_feature(x, stats, indices, f, config))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .fold(None::<(usize, f64, f64)>, |best, cand| match best {
            Some(b) if b.2 >= cand.2 => Some(b),
            _ => Some(cand),
        });

    match best_split {
        Some((feature, threshold, gain)) if gain > config.gamma && gain > 0.0 => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                indices.iter().partition(|&&i| x[[i, feature]] <= threshold);

            if left_idx.is_empty() || right_idx.is_empty() {
                return XGBNode::Leaf { weight: leaf_weight };
            }

            let left = build_xgb_tree(x, stats, &left_idx, feature_indices, depth + 1, config);
            let right = build_xgb_tree(x, stats, &right_idx, feature_indices, depth + 1, config);

            XGBNode::Split {
                feature,
                threshold,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        _ => XGBNode::Leaf { weight: leaf_weight },
    }
}

/// Optimal leaf weight with L1 (alpha) and L2 (lambda) regularization
fn compute_leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    if alpha > 0.0 {
        // Soft-threshold for L1
        let g_adj = if g_sum > alpha {
            g_sum - alpha
        } else if g_sum < -alpha {
            g_sum + alpha
        } else {
            return 0.0;
        };
        -g_adj / (h_sum + lambda)
    } else {
        -g_sum / (h_sum + lambda)
    }
}

/// Best (feature, threshold, gain) for a single feature using the exact greedy method
fn find_best_split_for_feature(
    x: &Array2<f64>,
    stats: &GradientPair<'_>,
    indices: &[usize],
    feature: usize,
    config: &XGBoostConfig,
) -> Option<(usize, f64, f64)> {
    let mut sorted_indices: Vec<usize> = indices.to_vec();
    sorted_indices.sort_by(|&a, &b| {
        x[[a, feature]]
            .partial_cmp(&x[[b, feature]])
            .unwrap_or(Ordering::Equal)
    });

    let g_total: f64 = sorted_indices.iter().map(|&i| stats.grad[i]).sum();
    let h_total: f64 = sorted_indices.iter().map(|&i| stats.hess[i]).sum();
    let lambda = config.reg_lambda;

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<(f64, f64)> = None;

    for pair in sorted_indices.windows(2) {
        let (idx, next_idx) = (pair[0], pair[1]);
        g_left += stats.grad[idx];
        h_left += stats.hess[idx];

        let value = x[[idx, feature]];
        let next_value = x[[next_idx, feature]];
        if (next_value - value).abs() < 1e-12 {
            continue;
        }

        let g_right = g_total - g_left;
        let h_right = h_total - h_left;

        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }

        let gain = 0.5
            * ((g_left * g_left) / (h_left + lambda) + (g_right * g_right) / (h_right + lambda)
                - (g_total * g_total) / (h_total + lambda));

        if best.map_or(true, |(g, _)| gain > g) {
            best = Some((gain, (value + next_value) / 2.0));
        }
    }

    best.map(|(gain, threshold)| (feature, threshold, gain))
}

/// XGBoost Regressor (squared error loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostRegressor {
    config: XGBoostConfig,
    trees: Vec<XGBNode>,
    base_score: f64,
    n_features: usize,
}

impl XGBoostRegressor {
    pub fn new(config: XGBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_score: 0.0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.config.validate()?;

        let n_samples = x.nrows();
        let n_features = x.ncols();
        self.n_features = n_features;

        // Base prediction = mean(y)
        self.base_score = y.mean().unwrap_or(0.0);
        let mut preds = Array1::from_elem(n_samples, self.base_score);
        let hess = Array1::from_elem(n_samples, 1.0);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        self.trees.clear();

        for _ in 0..self.config.n_estimators {
            // Squared error: grad = pred - y, hess = 1.0
            let grad: Array1<f64> = &preds - y;
            let stats = GradientPair {
                grad: &grad,
                hess: &hess,
            };

            let row_indices = subsample(&mut rng, n_samples, self.config.subsample);
            let col_indices = subsample(&mut rng, n_features, self.config.colsample_bytree);

            let tree = build_xgb_tree(x, &stats, &row_indices, &col_indices, 0, &self.config);

            for (pred, row) in preds.iter_mut().zip(x.rows()) {
                *pred += self.config.learning_rate * tree.predict(row);
            }

            self.trees.push(tree);
        }

        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ModelError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let lr = self.config.learning_rate;
        let preds: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| {
                self.base_score + self.trees.iter().map(|t| lr * t.predict(row)).sum::<f64>()
            })
            .collect();
        Ok(Array1::from_vec(preds))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = (((n as f64) * ratio).ceil() as usize).clamp(1, n);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(k);
    indices.sort_unstable();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::models::r2_score;

    fn regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((50, 2), (0..100).map(|i| i as f64 * 0.1).collect())
            .unwrap();
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|r| r[0] * 2.0 + r[1] * 0.5 + 1.0)
            .collect();
        (x, y)
    }

    #[test]
    fn test_xgboost_regressor() {
        let (x, y) = regression_data();
        let mut model = XGBoostRegressor::new(XGBoostConfig {
            n_estimators: 50,
            max_depth: 4,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        let r2 = r2_score(&y, &model.predict(&x).unwrap()).unwrap();
        assert!(r2 > 0.9, "XGBoost regressor R² = {}", r2);
    }

    #[test]
    fn test_subsampled_rounds_still_improve_every_row() {
        let (x, y) = regression_data();
        let mut model = XGBoostRegressor::new(XGBoostConfig {
            n_estimators: 40,
            subsample: 0.5,
            colsample_bytree: 0.5,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        let r2 = r2_score(&y, &model.predict(&x).unwrap()).unwrap();
        assert!(r2 > 0.8, "R² = {}", r2);
    }

    #[test]
    fn test_leaf_weight_soft_threshold() {
        assert_eq!(compute_leaf_weight(0.5, 10.0, 1.0, 1.0), 0.0);
        assert!((compute_leaf_weight(-4.0, 2.0, 1.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((compute_leaf_weight(3.0, 2.0, 1.0, 0.0) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_grid_params_applied() {
        let params = ParamSet::new()
            .with("learning_rate", 0.01)
            .with("n_estimators", 32usize);
        let config = XGBoostConfig::default().with_params(&params).unwrap();
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.n_estimators, 32);
        assert!(XGBoostConfig::default()
            .with_params(&ParamSet::new().with("iterations", 10usize))
            .is_err());
    }

    #[test]
    fn test_predict_wrong_width() {
        let (x, y) = regression_data();
        let mut model = XGBoostRegressor::new(XGBoostConfig {
            n_estimators: 2,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict(&Array2::zeros((1, 3))),
            Err(ModelError::ShapeError { .. })
        ));
    }
}
