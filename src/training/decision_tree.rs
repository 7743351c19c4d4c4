//! CART regression tree

use super::models::{check_fit_input, check_n_features, Estimator, FittedModel};
use super::params::{expect_str, expect_usize, unknown_param, ParamGrid, ParamSet};
use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node: samples with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if sample[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Split quality criterion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Criterion {
    /// Variance reduction, mean leaves
    SquaredError,
    /// Friedman's improvement score, mean leaves
    FriedmanMse,
    /// Mean absolute error reduction, median leaves
    AbsoluteError,
    /// Half Poisson deviance reduction; targets must be non-negative
    Poisson,
}

impl Criterion {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "squared_error" => Ok(Criterion::SquaredError),
            "friedman_mse" => Ok(Criterion::FriedmanMse),
            "absolute_error" => Ok(Criterion::AbsoluteError),
            "poisson" => Ok(Criterion::Poisson),
            other => Err(ModelError::invalid_parameter(
                "criterion",
                other,
                "expected squared_error, friedman_mse, absolute_error or poisson",
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::SquaredError => "squared_error",
            Criterion::FriedmanMse => "friedman_mse",
            Criterion::AbsoluteError => "absolute_error",
            Criterion::Poisson => "poisson",
        }
    }
}

/// Construction parameters for [`DecisionTreeRegressor`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeConfig {
    pub criterion: Criterion,
    /// Maximum depth (None = grow until leaves are pure or too small)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples in each leaf
    pub min_samples_leaf: usize,
    /// Number of randomly drawn features considered per split (None = all)
    pub max_features: Option<usize>,
    pub random_state: Option<u64>,
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self {
            criterion: Criterion::SquaredError,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: Some(42),
        }
    }
}

impl DecisionTreeConfig {
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_params(&self, params: &ParamSet) -> Result<Self> {
        let mut config = self.clone();
        for (name, value) in params.iter() {
            match name {
                "criterion" => config.criterion = Criterion::parse(expect_str(name, value)?)?,
                "max_depth" => config.max_depth = Some(expect_usize(name, value)?),
                "min_samples_split" => config.min_samples_split = expect_usize(name, value)?,
                "min_samples_leaf" => config.min_samples_leaf = expect_usize(name, value)?,
                "max_features" => config.max_features = Some(expect_usize(name, value)?),
                _ => return Err(unknown_param("DecisionTreeRegressor", name, value)),
            }
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.min_samples_split < 2 {
            return Err(ModelError::invalid_parameter(
                "min_samples_split",
                self.min_samples_split,
                "must be at least 2",
            ));
        }
        if self.min_samples_leaf < 1 {
            return Err(ModelError::invalid_parameter(
                "min_samples_leaf",
                self.min_samples_leaf,
                "must be at least 1",
            ));
        }
        if self.max_features == Some(0) {
            return Err(ModelError::invalid_parameter("max_features", 0, "must be at least 1"));
        }
        Ok(())
    }
}

impl Estimator for DecisionTreeConfig {
    fn hyperparameter_space(&self) -> ParamGrid {
        ParamGrid::new().axis(
            "criterion",
            ["squared_error", "friedman_mse", "absolute_error", "poisson"],
        )
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, params: &ParamSet) -> Result<FittedModel> {
        let mut model = DecisionTreeRegressor::new(self.with_params(params)?);
        model.fit(x, y)?;
        Ok(FittedModel::DecisionTreeRegressor(model))
    }
}

/// Best split found for one feature
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Regression tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    config: DecisionTreeConfig,
    root: Option<TreeNode>,
    n_features: usize,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self::new(DecisionTreeConfig::default())
    }
}

impl DecisionTreeRegressor {
    pub fn new(config: DecisionTreeConfig) -> Self {
        Self {
            config,
            root: None,
            n_features: 0,
        }
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_fit_input(x, y)?;
        self.config.validate()?;

        if self.config.criterion == Criterion::Poisson {
            if y.iter().any(|&v| v < 0.0) {
                return Err(ModelError::ValidationError(
                    "poisson criterion requires non-negative targets".to_string(),
                ));
            }
            if y.sum() <= 0.0 {
                return Err(ModelError::ValidationError(
                    "poisson criterion requires a positive target sum".to_string(),
                ));
            }
        }

        self.n_features = x.ncols();

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build_tree(x, y, &indices, 0, &mut rng));

        Ok(self)
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        rng: &mut Xoshiro256PlusPlus,
    ) -> TreeNode {
        let n_samples = indices.len();
        let y_subset: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
        let leaf = TreeNode::Leaf {
            value: self.leaf_value(&y_subset),
            n_samples,
        };

        let should_stop = n_samples < self.config.min_samples_split
            || n_samples < 2 * self.config.min_samples_leaf
            || self.config.max_depth.map_or(false, |d| depth >= d)
            || is_constant(&y_subset);

        if should_stop {
            return leaf;
        }

        let features = self.candidate_features(x.ncols(), rng);

        // Each feature finds its best split independently; ties go to the earlier feature
        let best = features
            .par_iter()
            .map(|&feature| self.best_split_for_feature(x, y, indices, feature))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .fold(None::<SplitCandidate>, |best, cand| match best {
                Some(b) if b.gain >= cand.gain => Some(b),
                _ => Some(cand),
            });

        let Some(split) = best else {
            return leaf;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, split.feature]] <= split.threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return leaf;
        }

        let left = Box::new(self.build_tree(x, y, &left_indices, depth + 1, rng));
        let right = Box::new(self.build_tree(x, y, &right_indices, depth + 1, rng));

        TreeNode::Split {
            feature_idx: split.feature,
            threshold: split.threshold,
            left,
            right,
            n_samples,
        }
    }

    fn candidate_features(&self, n_features: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut features: Vec<usize> = (0..n_features).collect();
        match self.config.max_features {
            Some(m) if m < n_features => {
                features.shuffle(rng);
                features.truncate(m);
                features.sort_unstable();
                features
            }
            _ => features,
        }
    }

    fn best_split_for_feature(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        feature: usize,
    ) -> Option<SplitCandidate> {
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(Ordering::Equal)
        });
        let xs: Vec<f64> = order.iter().map(|&i| x[[i, feature]]).collect();
        let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

        let (gain, pos) = match self.config.criterion {
            Criterion::AbsoluteError => self.sweep_absolute(&xs, &ys),
            _ => self.sweep_moments(&xs, &ys),
        }?;

        let mut threshold = (xs[pos - 1] + xs[pos]) / 2.0;
        if threshold >= xs[pos] {
            threshold = xs[pos - 1];
        }

        Some(SplitCandidate {
            feature,
            threshold,
            gain,
        })
    }

    /// Prefix-sum sweep for the mean-leaf criteria. Returns (gain, first right position).
    fn sweep_moments(&self, xs: &[f64], ys: &[f64]) -> Option<(f64, usize)> {
        let n = ys.len();
        let min_leaf = self.config.min_samples_leaf;

        let total_sum: f64 = ys.iter().sum();
        let total_sq: f64 = ys.iter().map(|v| v * v).sum();
        let total_ylogy: f64 = ys.iter().map(|&v| xlogx(v)).sum();

        let parent = match self.config.criterion {
            Criterion::Poisson => poisson_deviance(n, total_sum, total_ylogy),
            _ => sum_squared_error(n, total_sum, total_sq),
        };
        let min_gain = 1e-12 * parent.abs().max(1.0);

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        let mut left_ylogy = 0.0;
        let mut best: Option<(f64, usize)> = None;

        for pos in 1..n {
            let v = ys[pos - 1];
            left_sum += v;
            left_sq += v * v;
            left_ylogy += xlogx(v);

            if pos < min_leaf || n - pos < min_leaf || xs[pos - 1] == xs[pos] {
                continue;
            }

            let n_left = pos as f64;
            let n_right = (n - pos) as f64;
            let right_sum = total_sum - left_sum;

            let gain = match self.config.criterion {
                Criterion::FriedmanMse => {
                    let diff = left_sum / n_left - right_sum / n_right;
                    n_left * n_right * diff * diff / n as f64
                }
                Criterion::Poisson => {
                    if left_sum <= 0.0 || right_sum <= 0.0 {
                        continue;
                    }
                    parent
                        - poisson_deviance(pos, left_sum, left_ylogy)
                        - poisson_deviance(n - pos, right_sum, total_ylogy - left_ylogy)
                }
                _ => {
                    parent
                        - sum_squared_error(pos, left_sum, left_sq)
                        - sum_squared_error(n - pos, right_sum, total_sq - left_sq)
                }
            };

            if gain > min_gain && best.map_or(true, |(g, _)| gain > g) {
                best = Some((gain, pos));
            }
        }

        best
    }

    /// Sweep for the absolute error criterion, keeping both sides sorted by target
    fn sweep_absolute(&self, xs: &[f64], ys: &[f64]) -> Option<(f64, usize)> {
        let n = ys.len();
        let min_leaf = self.config.min_samples_leaf;

        let mut right: Vec<f64> = ys.to_vec();
        right.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mut left: Vec<f64> = Vec::with_capacity(n);

        let parent = absolute_deviation(&right);
        let min_gain = 1e-12 * parent.max(1.0);
        let mut best: Option<(f64, usize)> = None;

        for pos in 1..n {
            let v = ys[pos - 1];
            let at = right.partition_point(|&r| r < v);
            right.remove(at);
            let at = left.partition_point(|&l| l < v);
            left.insert(at, v);

            if pos < min_leaf || n - pos < min_leaf || xs[pos - 1] == xs[pos] {
                continue;
            }

            let gain = parent - absolute_deviation(&left) - absolute_deviation(&right);
            if gain > min_gain && best.map_or(true, |(g, _)| gain > g) {
                best = Some((gain, pos));
            }
        }

        best
    }

    fn leaf_value(&self, y: &[f64]) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        match self.config.criterion {
            Criterion::AbsoluteError => {
                let mut sorted = y.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                median_of_sorted(&sorted)
            }
            _ => y.iter().sum::<f64>() / y.len() as f64,
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(ModelError::ModelNotFitted)?;
        check_n_features(self.n_features, x)?;
        Ok(x.rows().into_iter().map(|row| root.predict(row)).collect())
    }

    /// Tree depth counting the root as level 1 (0 when unfitted)
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn config(&self) -> &DecisionTreeConfig {
        &self.config
    }
}

fn is_constant(y: &[f64]) -> bool {
    match y.first() {
        None => true,
        Some(&first) => y.iter().all(|&v| (v - first).abs() < 1e-10),
    }
}

fn xlogx(v: f64) -> f64 {
    if v > 0.0 {
        v * v.ln()
    } else {
        0.0
    }
}

/// Total squared error around the mean from running moments
fn sum_squared_error(n: usize, sum: f64, sq_sum: f64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    sq_sum - sum * sum / n as f64
}

/// Total half Poisson deviance around the mean from running moments
fn poisson_deviance(n: usize, sum: f64, ylogy: f64) -> f64 {
    if n == 0 || sum <= 0.0 {
        return 0.0;
    }
    ylogy - sum * (sum / n as f64).ln()
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        0.0
    } else if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Total absolute deviation around the median of an already sorted slice
fn absolute_deviation(sorted: &[f64]) -> f64 {
    let median = median_of_sorted(sorted);
    sorted.iter().map(|v| (v - median).abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0], [5.0, 0.0], [6.0, 0.0]];
        let y = array![1.0, 1.0, 1.0, 5.0, 5.0, 5.0];
        (x, y)
    }

    #[test]
    fn test_regressor_simple() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTreeRegressor::default();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        let mse: f64 = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64;

        assert!(mse < 1e-12, "MSE too high: {}", mse);
    }

    #[test]
    fn test_every_criterion_finds_the_step() {
        let (x, y) = step_data();
        for criterion in [
            Criterion::SquaredError,
            Criterion::FriedmanMse,
            Criterion::AbsoluteError,
            Criterion::Poisson,
        ] {
            let mut tree = DecisionTreeRegressor::new(
                DecisionTreeConfig::default()
                    .with_criterion(criterion)
                    .with_max_depth(1),
            );
            tree.fit(&x, &y).unwrap();
            let pred = tree.predict(&array![[2.0, 0.0], [5.0, 0.0]]).unwrap();
            assert_eq!(pred[0], 1.0, "{:?}", criterion);
            assert_eq!(pred[1], 5.0, "{:?}", criterion);
        }
    }

    #[test]
    fn test_absolute_error_uses_median_leaves() {
        let x = array![[0.0], [0.0], [0.0]];
        let y = array![1.0, 2.0, 30.0];
        let mut tree =
            DecisionTreeRegressor::new(DecisionTreeConfig::default().with_criterion(Criterion::AbsoluteError));
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&array![[0.0]]).unwrap()[0], 2.0);
    }

    #[test]
    fn test_poisson_rejects_negative_targets() {
        let x = array![[0.0], [1.0]];
        let y = array![-1.0, 2.0];
        let mut tree =
            DecisionTreeRegressor::new(DecisionTreeConfig::default().with_criterion(Criterion::Poisson));
        assert!(matches!(tree.fit(&x, &y), Err(ModelError::ValidationError(_))));
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = array![1.0, 4.0, 2.0, 8.0, 3.0, 9.0, 0.0, 7.0];

        let mut tree = DecisionTreeRegressor::new(DecisionTreeConfig::default().with_max_depth(2));
        tree.fit(&x, &y).unwrap();

        assert!(tree.get_depth() <= 3);
        assert!(tree.get_n_leaves() <= 4);
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let (x, y) = step_data();
        let mut tree =
            DecisionTreeRegressor::new(DecisionTreeConfig::default().with_min_samples_leaf(3));
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.get_n_leaves(), 2);
    }

    #[test]
    fn test_criterion_from_grid() {
        let config = DecisionTreeConfig::default();
        let params = ParamSet::new().with("criterion", "friedman_mse");
        assert_eq!(config.with_params(&params).unwrap().criterion, Criterion::FriedmanMse);

        let bad = ParamSet::new().with("criterion", "gini");
        assert!(config.with_params(&bad).is_err());
    }

    #[test]
    fn test_predict_unfitted() {
        let tree = DecisionTreeRegressor::default();
        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(ModelError::ModelNotFitted)
        ));
    }
}
