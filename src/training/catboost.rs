//! CatBoost-style gradient boosting
//!
//! Key features:
//! - Symmetric (oblivious) decision trees: all nodes at same depth use the same split
//! - Features are quantized once into at most `border_count` borders; splits are
//!   searched over per-leaf gradient histograms of those borders

use super::models::{check_fit_input, check_n_features, Estimator, FittedModel};
use super::params::{expect_float, expect_usize, unknown_param, ParamGrid, ParamSet};
use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostConfig {
    /// Number of boosting iterations (trees)
    pub iterations: usize,
    pub learning_rate: f64,
    /// Depth of every symmetric tree
    pub depth: usize,
    /// L2 regularization of leaf values
    pub l2_leaf_reg: f64,
    /// Maximum number of split borders per feature
    pub border_count: usize,
    pub subsample: f64,
    pub random_state: Option<u64>,
}

impl Default for CatBoostConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            learning_rate: 0.03,
            depth: 6,
            l2_leaf_reg: 3.0,
            border_count: 254,
            subsample: 1.0,
            random_state: Some(42),
        }
    }
}

impl CatBoostConfig {
    pub fn with_params(&self, params: &ParamSet) -> Result<Self> {
        let mut config = self.clone();
        for (name, value) in params.iter() {
            match name {
                "learning_rate" => config.learning_rate = expect_float(name, value)?,
                "iterations" => config.iterations = expect_usize(name, value)?,
                "depth" => config.depth = expect_usize(name, value)?,
                "l2_leaf_reg" => config.l2_leaf_reg = expect_float(name, value)?,
                "border_count" => config.border_count = expect_usize(name, value)?,
                "subsample" => config.subsample = expect_float(name, value)?,
                _ => return Err(unknown_param("CatBoostRegressor", name, value)),
            }
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(ModelError::invalid_parameter("iterations", 0, "must be at least 1"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ModelError::invalid_parameter(
                "learning_rate",
                self.learning_rate,
                "must be positive",
            ));
        }
        if self.depth == 0 || self.depth > 16 {
            return Err(ModelError::invalid_parameter("depth", self.depth, "must be in 1..=16"));
        }
        if self.border_count == 0 || self.border_count > u16::MAX as usize {
            return Err(ModelError::invalid_parameter(
                "border_count",
                self.border_count,
                "must be in 1..=65535",
            ));
        }
        if self.l2_leaf_reg < 0.0 {
            return Err(ModelError::invalid_parameter(
                "l2_leaf_reg",
                self.l2_leaf_reg,
                "must be non-negative",
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

impl Estimator for CatBoostConfig {
    fn hyperparameter_space(&self) -> ParamGrid {
        ParamGrid::new()
            .axis("learning_rate", [0.1, 0.01, 0.05, 0.001])
            .axis("iterations", [30usize, 50, 100])
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, params: &ParamSet) -> Result<FittedModel> {
        let mut model = CatBoostRegressor::new(self.with_params(params)?);
        model.fit(x, y)?;
        Ok(FittedModel::CatBoostRegressor(model))
    }
}

/// Symmetric (oblivious) tree: each level uses the same split feature + threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SymmetricTree {
    splits: Vec<(usize, f64)>, // (feature, threshold) per level
    leaf_values: Vec<f64>,     // 2^depth leaf values
}

impl SymmetricTree {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut idx = 0usize;
        for &(feature, threshold) in &self.splits {
            idx = idx * 2 + usize::from(sample[feature] > threshold);
        }
        self.leaf_values[idx]
    }
}

/// Per-feature split borders and the bin of every training sample
struct Quantized {
    borders: Vec<Vec<f64>>,
    /// bins[feature][sample] = number of borders strictly below the value
    bins: Vec<Vec<u16>>,
}

impl Quantized {
    fn new(x: &Array2<f64>, border_count: usize) -> Self {
        let (borders, bins) = x
            .columns()
            .into_iter()
            .map(|column| {
                let borders = feature_borders(column, border_count);
                let bins = column
                    .iter()
                    .map(|&v| borders.partition_point(|&t| t < v) as u16)
                    .collect();
                (borders, bins)
            })
            .unzip();
        Self { borders, bins }
    }
}

/// Midpoints between distinct values, thinned evenly down to `border_count`
fn feature_borders(column: ArrayView1<f64>, border_count: usize) -> Vec<f64> {
    let mut values: Vec<f64> = column.to_vec();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    values.dedup();

    let midpoints: Vec<f64> = values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    if midpoints.len() <= border_count {
        return midpoints;
    }

    let step = midpoints.len() as f64 / border_count as f64;
    let mut borders: Vec<f64> = (0..border_count)
        .map(|i| midpoints[((i as f64 + 0.5) * step) as usize])
        .collect();
    borders.dedup();
    borders
}

/// Best border for one feature given the current leaf assignment: (border index, gain)
fn best_border(
    bins: &[u16],
    n_borders: usize,
    gradients: &[f64],
    indices: &[usize],
    leaf_of: &[usize],
    n_leaves: usize,
    reg_lambda: f64,
) -> Option<(usize, f64)> {
    if n_borders == 0 {
        return None;
    }
    let n_bins = n_borders + 1;

    // Histograms of gradient sum and count per (leaf, bin); the hessian is 1
    let mut g_hist = vec![0.0; n_leaves * n_bins];
    let mut h_hist = vec![0.0; n_leaves * n_bins];
    for &i in indices {
        let slot = leaf_of[i] * n_bins + bins[i] as usize;
        g_hist[slot] += gradients[i];
        h_hist[slot] += 1.0;
    }

    // Running left sums per leaf as the border moves right
    let mut g_left = vec![0.0; n_leaves];
    let mut h_left = vec![0.0; n_leaves];
    let totals: Vec<(f64, f64)> = (0..n_leaves)
        .map(|leaf| {
            let range = leaf * n_bins..(leaf + 1) * n_bins;
            (g_hist[range.clone()].iter().sum(), h_hist[range].iter().sum())
        })
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for border in 0..n_borders {
        let mut gain = 0.0;
        for leaf in 0..n_leaves {
            g_left[leaf] += g_hist[leaf * n_bins + border];
            h_left[leaf] += h_hist[leaf * n_bins + border];
            let (g, h) = totals[leaf];
            let (gl, hl) = (g_left[leaf], h_left[leaf]);
            let (gr, hr) = (g - gl, h - hl);
            gain += gl * gl / (hl + reg_lambda) + gr * gr / (hr + reg_lambda)
                - g * g / (h + reg_lambda);
        }
        if best.map_or(true, |(_, g)| gain > g) {
            best = Some((border, gain));
        }
    }
    best
}

fn build_symmetric_tree(
    quantized: &Quantized,
    gradients: &[f64],
    indices: &[usize],
    config: &CatBoostConfig,
) -> SymmetricTree {
    let n_samples = gradients.len();
    let mut splits = Vec::with_capacity(config.depth);
    let mut leaf_of = vec![0usize; n_samples];
    let mut n_leaves = 1usize;

    for _level in 0..config.depth {
        let best = quantized
            .bins
            .par_iter()
            .enumerate()
            .map(|(feature, bins)| {
                best_border(
                    bins,
                    quantized.borders[feature].len(),
                    gradients,
                    indices,
                    &leaf_of,
                    n_leaves,
                    config.l2_leaf_reg,
                )
                .map(|(border, gain)| (feature, border, gain))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .fold(None::<(usize, usize, f64)>, |best, cand| match best {
                Some(b) if b.2 >= cand.2 => Some(b),
                _ => Some(cand),
            });

        match best {
            Some((feature, border, gain)) if gain > 1e-12 => {
                splits.push((feature, quantized.borders[feature][border]));
                let bins = &quantized.bins[feature];
                for &i in indices {
                    leaf_of[i] = leaf_of[i] * 2 + usize::from(bins[i] as usize > border);
                }
                n_leaves *= 2;
            }
            _ => break,
        }
    }

    let mut g_sum = vec![0.0; n_leaves];
    let mut count = vec![0.0; n_leaves];
    for &i in indices {
        g_sum[leaf_of[i]] += gradients[i];
        count[leaf_of[i]] += 1.0;
    }
    let leaf_values = g_sum
        .iter()
        .zip(&count)
        .map(|(g, h)| if *h > 0.0 { -g / (h + config.l2_leaf_reg) } else { 0.0 })
        .collect();

    SymmetricTree {
        splits,
        leaf_values,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostRegressor {
    config: CatBoostConfig,
    trees: Vec<SymmetricTree>,
    base_prediction: f64,
    n_features: usize,
}

impl CatBoostRegressor {
    pub fn new(config: CatBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_prediction: 0.0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.config.validate()?;

        let n = x.nrows();
        self.n_features = x.ncols();
        self.trees.clear();

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        let quantized = Quantized::new(x, self.config.border_count);

        self.base_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n, self.base_prediction);

        for _ in 0..self.config.iterations {
            let gradients: Vec<f64> = predictions
                .iter()
                .zip(y.iter())
                .map(|(&p, &yi)| p - yi)
                .collect();

            let indices: Vec<usize> = if self.config.subsample < 1.0 {
                let k = ((n as f64 * self.config.subsample).ceil() as usize).clamp(1, n);
                let mut sub: Vec<usize> = (0..n).collect();
                sub.shuffle(&mut rng);
                sub.truncate(k);
                sub
            } else {
                (0..n).collect()
            };

            let tree = build_symmetric_tree(&quantized, &gradients, &indices, &self.config);

            for (pred, row) in predictions.iter_mut().zip(x.rows()) {
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
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.base_prediction + self.trees.iter().map(|t| lr * t.predict(row)).sum::<f64>()
            })
            .collect())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::models::r2_score;

    fn make_regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((100, 3), (0..300).map(|i| (i as f64) / 100.0).collect())
            .unwrap();
        let y = Array1::from_vec((0..100).map(|i| 2.0 * (i * 3) as f64 / 100.0 + 0.1).collect());
        (x, y)
    }

    #[test]
    fn test_catboost_regressor() {
        let (x, y) = make_regression_data();
        let config = CatBoostConfig {
            iterations: 100,
            learning_rate: 0.1,
            depth: 4,
            ..Default::default()
        };
        let mut model = CatBoostRegressor::new(config);
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        assert_eq!(preds.len(), 100);
        assert!(r2_score(&y, &preds).unwrap() > 0.9);
    }

    #[test]
    fn test_catboost_symmetric_tree() {
        let (x, y) = make_regression_data();
        let config = CatBoostConfig {
            iterations: 5,
            depth: 3,
            ..Default::default()
        };
        let mut model = CatBoostRegressor::new(config);
        model.fit(&x, &y).unwrap();
        for tree in &model.trees {
            assert!(tree.splits.len() <= 3);
            assert_eq!(tree.leaf_values.len(), 1 << tree.splits.len());
        }
    }

    #[test]
    fn test_border_thinning() {
        let column = Array1::from_vec((0..1000).map(|i| i as f64).collect());
        let borders = feature_borders(column.view(), 254);
        assert!(borders.len() <= 254);
        assert!(borders.windows(2).all(|w| w[0] < w[1]));

        let constant = Array1::from_elem(10, 3.0);
        assert!(feature_borders(constant.view(), 254).is_empty());
    }

    #[test]
    fn test_iterations_hyperparameter() {
        let params = ParamSet::new()
            .with("learning_rate", 0.05)
            .with("iterations", 30usize);
        let config = CatBoostConfig::default().with_params(&params).unwrap();
        assert_eq!(config.iterations, 30);
        assert!(CatBoostConfig::default()
            .with_params(&ParamSet::new().with("n_estimators", 30usize))
            .is_err());
    }
}
