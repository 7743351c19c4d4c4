//! Random Forest implementation

use super::decision_tree::{Criterion, DecisionTreeConfig, DecisionTreeRegressor};
use super::models::{check_fit_input, check_n_features, Estimator, FittedModel};
use super::params::{expect_float, expect_usize, unknown_param, ParamGrid, ParamSet};
use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }
}

/// Construction parameters for [`RandomForestRegressor`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            criterion: Criterion::SquaredError,
            random_state: Some(42),
        }
    }
}

impl RandomForestConfig {
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
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
                "n_estimators" => config.n_estimators = expect_usize(name, value)?,
                "max_depth" => config.max_depth = Some(expect_usize(name, value)?),
                "min_samples_split" => config.min_samples_split = expect_usize(name, value)?,
                "min_samples_leaf" => config.min_samples_leaf = expect_usize(name, value)?,
                "max_features" => {
                    config.max_features = MaxFeatures::Fraction(expect_float(name, value)?)
                }
                _ => return Err(unknown_param("RandomForestRegressor", name, value)),
            }
        }
        if config.n_estimators == 0 {
            return Err(ModelError::invalid_parameter(
                "n_estimators",
                0,
                "must be at least 1",
            ));
        }
        if let MaxFeatures::Fraction(f) = config.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(ModelError::invalid_parameter(
                    "max_features",
                    f,
                    "fraction must be in (0, 1]",
                ));
            }
        }
        Ok(config)
    }
}

impl Estimator for RandomForestConfig {
    fn hyperparameter_space(&self) -> ParamGrid {
        ParamGrid::new().axis("n_estimators", [8usize, 16, 32, 64, 128, 256])
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, params: &ParamSet) -> Result<FittedModel> {
        let mut model = RandomForestRegressor::new(self.with_params(params)?);
        model.fit(x, y)?;
        Ok(FittedModel::RandomForestRegressor(model))
    }
}

/// Bagged ensemble of regression trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    config: RandomForestConfig,
    trees: Vec<DecisionTreeRegressor>,
    n_features: usize,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(RandomForestConfig::default())
    }
}

impl RandomForestRegressor {
    pub fn new(config: RandomForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_fit_input(x, y)?;

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        let max_features = self.config.max_features.resolve(self.n_features);
        let base_seed = self.config.random_state.unwrap_or(42);
        let config = &self.config;

        // Tree i always uses seed base + i, so the forest does not depend on thread scheduling
        let trees: Vec<DecisionTreeRegressor> = (0..config.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let mut tree = DecisionTreeRegressor::new(DecisionTreeConfig {
                    criterion: config.criterion,
                    max_depth: config.max_depth,
                    min_samples_split: config.min_samples_split,
                    min_samples_leaf: config.min_samples_leaf,
                    max_features: Some(max_features),
                    random_state: Some(seed),
                });

                if config.bootstrap {
                    let sample_indices: Vec<usize> =
                        (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                    let x_boot = x.select(Axis(0), &sample_indices);
                    let y_boot = y.select(Axis(0), &sample_indices);
                    tree.fit(&x_boot, &y_boot)?;
                } else {
                    tree.fit(x, y)?;
                }

                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        Ok(self)
    }

    /// Mean of the per-tree predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ModelError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let all_predictions: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let mut sum = Array1::zeros(x.nrows());
        for preds in &all_predictions {
            sum += preds;
        }
        Ok(sum / all_predictions.len() as f64)
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
    use ndarray::array;

    fn noisy_line() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((60, 2), |(i, j)| if j == 0 { i as f64 } else { (i % 7) as f64 });
        let y = x.column(0).mapv(|v| 3.0 * v + 1.0);
        (x, y)
    }

    #[test]
    fn test_regressor() {
        let (x, y) = noisy_line();
        let mut rf = RandomForestRegressor::new(RandomForestConfig::default().with_n_estimators(10));
        rf.fit(&x, &y).unwrap();

        assert_eq!(rf.n_trees(), 10);
        let predictions = rf.predict(&x).unwrap();
        let r2 = r2_score(&y, &predictions).unwrap();
        assert!(r2 > 0.95, "r2 = {}", r2);
    }

    #[test]
    fn test_seeded_forest_is_reproducible() {
        let (x, y) = noisy_line();
        let config = RandomForestConfig::default()
            .with_n_estimators(8)
            .with_max_features(MaxFeatures::Sqrt);

        let mut a = RandomForestRegressor::new(config.clone());
        let mut b = RandomForestRegressor::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();

        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_n_estimators_from_grid() {
        let params = ParamSet::new().with("n_estimators", 16usize);
        let config = RandomForestConfig::default().with_params(&params).unwrap();
        assert_eq!(config.n_estimators, 16);

        let zero = ParamSet::new().with("n_estimators", 0usize);
        assert!(RandomForestConfig::default().with_params(&zero).is_err());
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(9), 3);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
        assert_eq!(MaxFeatures::Fixed(20).resolve(7), 7);
        assert_eq!(MaxFeatures::Fraction(0.01).resolve(7), 1);
    }

    #[test]
    fn test_predict_unfitted() {
        let rf = RandomForestRegressor::default();
        assert!(matches!(
            rf.predict(&array![[1.0, 2.0]]),
            Err(ModelError::ModelNotFitted)
        ));
    }
}
