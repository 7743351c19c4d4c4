//! Estimator capability trait, fitted model variants and regression metrics

use super::adaboost::AdaBoostRegressor;
use super::catboost::CatBoostRegressor;
use super::decision_tree::DecisionTreeRegressor;
use super::gradient_boosting::GradientBoostingRegressor;
use super::knn::KNNRegressor;
use super::linear_models::LinearRegression;
use super::params::{ParamGrid, ParamSet};
use super::random_forest::RandomForestRegressor;
use super::xgboost::XGBoostRegressor;
use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Metrics for regression model evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// Coefficient of determination
    pub r2: f64,
    /// Number of evaluated samples
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Compute regression metrics
    pub fn compute_regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        check_same_length(y_true, y_pred)?;

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2: r2_score(y_true, y_pred)?,
            n_samples: y_true.len(),
        })
    }
}

/// Coefficient of determination: 1 - SS_res / SS_tot.
///
/// A constant target scores 1.0 when predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    check_same_length(y_true, y_pred)?;

    let n = y_true.len() as f64;
    let y_mean = y_true.sum() / n;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - y_mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }

    Ok(1.0 - ss_res / ss_tot)
}

fn check_same_length(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(ModelError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    if y_true.is_empty() {
        return Err(ModelError::ValidationError(
            "cannot score an empty target vector".to_string(),
        ));
    }
    Ok(())
}

/// Validate a training pair: non-empty, finite, and one label per row
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(ModelError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(ModelError::ValidationError(format!(
            "cannot fit on an empty matrix ({} x {})",
            x.nrows(),
            x.ncols()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(ModelError::InvalidInput(
            "training data contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

/// Validate the column count of a prediction matrix against the training schema
pub(crate) fn check_n_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(ModelError::ShapeError {
            expected: format!("{} feature columns", expected),
            actual: format!("{} feature columns", x.ncols()),
        });
    }
    Ok(())
}

/// Uniform capability interface of a regression algorithm.
///
/// Implementors are immutable specifications: `fit` never mutates `self` and
/// returns a brand-new [`FittedModel`].
pub trait Estimator: Debug + Send + Sync {
    /// Default hyperparameter search space for this algorithm
    fn hyperparameter_space(&self) -> ParamGrid;

    /// Fit a new model on `(x, y)` with `params` applied over the construction parameters
    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, params: &ParamSet) -> Result<FittedModel>;

    /// Goodness of fit of `model` on `(x, y)`; higher is better
    fn score(&self, model: &FittedModel, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        let y_pred = model.predict(x)?;
        r2_score(y, &y_pred)
    }
}

/// A fitted regressor of any supported algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedModel {
    LinearRegression(LinearRegression),
    KNNRegressor(KNNRegressor),
    DecisionTreeRegressor(DecisionTreeRegressor),
    RandomForestRegressor(RandomForestRegressor),
    GradientBoostingRegressor(GradientBoostingRegressor),
    XGBoostRegressor(XGBoostRegressor),
    CatBoostRegressor(CatBoostRegressor),
    AdaBoostRegressor(AdaBoostRegressor),
}

impl FittedModel {
    /// Predict one target per row of `x`
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            FittedModel::LinearRegression(m) => m.predict(x),
            FittedModel::KNNRegressor(m) => m.predict(x),
            FittedModel::DecisionTreeRegressor(m) => m.predict(x),
            FittedModel::RandomForestRegressor(m) => m.predict(x),
            FittedModel::GradientBoostingRegressor(m) => m.predict(x),
            FittedModel::XGBoostRegressor(m) => m.predict(x),
            FittedModel::CatBoostRegressor(m) => m.predict(x),
            FittedModel::AdaBoostRegressor(m) => m.predict(x),
        }
    }

    /// Number of feature columns seen during fitting
    pub fn n_features(&self) -> usize {
        match self {
            FittedModel::LinearRegression(m) => m.n_features(),
            FittedModel::KNNRegressor(m) => m.n_features(),
            FittedModel::DecisionTreeRegressor(m) => m.n_features(),
            FittedModel::RandomForestRegressor(m) => m.n_features(),
            FittedModel::GradientBoostingRegressor(m) => m.n_features(),
            FittedModel::XGBoostRegressor(m) => m.n_features(),
            FittedModel::CatBoostRegressor(m) => m.n_features(),
            FittedModel::AdaBoostRegressor(m) => m.n_features(),
        }
    }

    /// Short algorithm label
    pub fn kind(&self) -> &'static str {
        match self {
            FittedModel::LinearRegression(_) => "linear_regression",
            FittedModel::KNNRegressor(_) => "knn",
            FittedModel::DecisionTreeRegressor(_) => "decision_tree",
            FittedModel::RandomForestRegressor(_) => "random_forest",
            FittedModel::GradientBoostingRegressor(_) => "gradient_boosting",
            FittedModel::XGBoostRegressor(_) => "xgboost",
            FittedModel::CatBoostRegressor(_) => "catboost",
            FittedModel::AdaBoostRegressor(_) => "adaboost",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_pred = array![1.1, 2.0, 2.9, 4.1, 5.0];

        let metrics = ModelMetrics::compute_regression(&y_true, &y_pred).unwrap();

        assert!(metrics.mse > 0.0);
        assert!((metrics.rmse - metrics.mse.sqrt()).abs() < 1e-12);
        assert!(metrics.r2 > 0.9);
        assert_eq!(metrics.n_samples, 5);
    }

    #[test]
    fn test_r2_perfect_and_mean_predictor() {
        let y = array![1.0, 2.0, 3.0];
        assert_eq!(r2_score(&y, &y).unwrap(), 1.0);

        let mean = array![2.0, 2.0, 2.0];
        assert!(r2_score(&y, &mean).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_r2_can_be_negative() {
        let y = array![1.0, 2.0, 3.0];
        let bad = array![3.0, 2.0, 1.0];
        assert!((r2_score(&y, &bad).unwrap() - (-3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_r2_constant_target() {
        let y = array![4.0, 4.0];
        assert_eq!(r2_score(&y, &array![4.0, 4.0]).unwrap(), 1.0);
        assert_eq!(r2_score(&y, &array![4.0, 5.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_r2_shape_errors() {
        assert!(matches!(
            r2_score(&array![1.0, 2.0], &array![1.0]),
            Err(ModelError::ShapeError { .. })
        ));
        let empty: Array1<f64> = Array1::zeros(0);
        assert!(matches!(
            r2_score(&empty, &empty),
            Err(ModelError::ValidationError(_))
        ));
    }

    #[test]
    fn test_check_fit_input_rejects_nan() {
        let x = array![[1.0], [f64::NAN]];
        let y = array![1.0, 2.0];
        assert!(matches!(
            check_fit_input(&x, &y),
            Err(ModelError::InvalidInput(_))
        ));
    }
}
