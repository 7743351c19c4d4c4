//! K-Nearest Neighbors regression

use super::models::{check_fit_input, check_n_features, Estimator, FittedModel};
use super::params::{expect_str, expect_usize, unknown_param, ParamGrid, ParamSet};
use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    /// Distance metric
    pub metric: DistanceMetric,
    /// Weighting scheme
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

impl KNNConfig {
    pub fn with_params(&self, params: &ParamSet) -> Result<Self> {
        let mut config = self.clone();
        for (name, value) in params.iter() {
            match name {
                "n_neighbors" => config.n_neighbors = expect_usize(name, value)?,
                "weights" => {
                    config.weights = match expect_str(name, value)? {
                        "uniform" => WeightScheme::Uniform,
                        "distance" => WeightScheme::Distance,
                        other => {
                            return Err(ModelError::invalid_parameter(
                                name,
                                other,
                                "expected \"uniform\" or \"distance\"",
                            ))
                        }
                    }
                }
                _ => return Err(unknown_param("KNNRegressor", name, value)),
            }
        }
        if config.n_neighbors == 0 {
            return Err(ModelError::invalid_parameter(
                "n_neighbors",
                0,
                "must be at least 1",
            ));
        }
        Ok(config)
    }
}

impl Estimator for KNNConfig {
    fn hyperparameter_space(&self) -> ParamGrid {
        ParamGrid::new().axis("n_neighbors", [5usize, 7, 9, 11])
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, params: &ParamSet) -> Result<FittedModel> {
        let mut model = KNNRegressor::new(self.with_params(params)?);
        model.fit(x, y)?;
        Ok(FittedModel::KNNRegressor(model))
    }
}

/// K-Nearest Neighbors Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    config: KNNConfig,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl KNNRegressor {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: None,
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    /// Fit the regressor (stores training data)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.config.n_neighbors == 0 || self.config.n_neighbors > x.nrows() {
            return Err(ModelError::invalid_parameter(
                "n_neighbors",
                self.config.n_neighbors,
                format!("must be between 1 and the number of training rows ({})", x.nrows()),
            ));
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    /// Predict target values (parallelized over query rows)
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x_train), Some(y_train)) => (x_train, y_train),
            _ => return Err(ModelError::ModelNotFitted),
        };
        check_n_features(x_train.ncols(), x)?;

        let k = self.config.n_neighbors;
        let metric = self.config.metric;
        let weights = self.config.weights;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, y_train, k, metric);
                weighted_mean(&neighbors, weights)
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    pub fn n_features(&self) -> usize {
        self.x_train.as_ref().map_or(0, |x| x.ncols())
    }
}

/// Max-heap entry keyed on distance, then on training row index so ties are deterministic
#[derive(PartialEq)]
struct Neighbor {
    dist: f64,
    row: usize,
    label: f64,
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then(self.row.cmp(&other.row))
    }
}

/// Find k nearest neighbors using a max-heap: O(n log k)
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (row, train_row) in x_train.rows().into_iter().enumerate() {
        let candidate = Neighbor {
            dist: compute_distance(point, train_row, metric),
            row,
            label: y_train[row],
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(top) = heap.peek() {
            if candidate < *top {
                heap.pop();
                heap.push(candidate);
            }
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|n| (n.dist, n.label))
        .collect()
}

fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi) * (ai - bi))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
        DistanceMetric::Minkowski(p) => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p),
    }
}

fn weighted_mean(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    match weights {
        WeightScheme::Uniform => {
            neighbors.iter().map(|(_, label)| label).sum::<f64>() / neighbors.len().max(1) as f64
        }
        WeightScheme::Distance => {
            // An exact match takes over the prediction
            let exact: Vec<f64> = neighbors
                .iter()
                .filter(|(d, _)| *d == 0.0)
                .map(|(_, label)| *label)
                .collect();
            if !exact.is_empty() {
                return exact.iter().sum::<f64>() / exact.len() as f64;
            }
            let (num, den) = neighbors
                .iter()
                .fold((0.0, 0.0), |(num, den), (d, label)| (num + label / d, den + 1.0 / d));
            num / den
        }
    }
}
