//! Ordinary least squares regression

use super::models::{check_fit_input, check_n_features, Estimator, FittedModel};
use super::params::{expect_str, unknown_param, ParamGrid, ParamSet};
use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Relative pivot tolerance below which the normal equations are treated as singular
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve symmetric positive-definite system Ax = b using Cholesky decomposition.
/// Retries once with a small ridge on the diagonal if the matrix is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    match cholesky_factor(a) {
        Some(l) => Some(cholesky_substitute(&l, b)),
        None => {
            let mut a_reg = a.clone();
            let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
            for k in 0..n {
                a_reg[[k, k]] += ridge;
            }
            cholesky_factor(&a_reg).map(|l| cholesky_substitute(&l, b))
        }
    }
}

/// Lower-triangular factor L with A = L * L^T, or None if A is not (numerically) PD
fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let scale = a.diag().iter().fold(0.0f64, |m, v| m.max(v.abs())).max(f64::MIN_POSITIVE);
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= PIVOT_TOLERANCE * scale {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    Some(l)
}

fn cholesky_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // Forward substitution: L * y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    x
}

/// Matrix inversion via Gauss-Jordan elimination with partial pivoting (fallback)
fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    let mut aug = Array2::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }

        if max_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [max_row, j]);
            }
        }

        if aug[[col, col]].abs() < 1e-10 {
            return None;
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..2 * n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    let mut inv = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            inv[[i, j]] = aug[[i, n + j]];
        }
    }

    Some(inv)
}

/// Solve least squares via normal equations: (X^T X) w = X^T y
fn solve_least_squares(x: &Array2<f64>, y: &Array1<f64>) -> Option<Array1<f64>> {
    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);

    if let Some(result) = cholesky_solve(&xtx, &xty) {
        return Some(result);
    }

    matrix_inverse(&xtx).map(|inv| inv.dot(&xty))
}

/// Construction parameters for [`LinearRegression`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegressionConfig {
    /// Whether to fit an intercept term
    pub fit_intercept: bool,
}

impl Default for LinearRegressionConfig {
    fn default() -> Self {
        Self { fit_intercept: true }
    }
}

impl LinearRegressionConfig {
    pub fn with_params(&self, params: &ParamSet) -> Result<Self> {
        let mut config = self.clone();
        for (name, value) in params.iter() {
            match name {
                "fit_intercept" => {
                    config.fit_intercept = match expect_str(name, value)? {
                        "true" => true,
                        "false" => false,
                        other => {
                            return Err(ModelError::invalid_parameter(
                                name,
                                other,
                                "expected \"true\" or \"false\"",
                            ))
                        }
                    }
                }
                _ => return Err(unknown_param("LinearRegression", name, value)),
            }
        }
        Ok(config)
    }
}

impl Estimator for LinearRegressionConfig {
    fn hyperparameter_space(&self) -> ParamGrid {
        ParamGrid::new()
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, params: &ParamSet) -> Result<FittedModel> {
        let mut model = LinearRegression::new(self.with_params(params)?);
        model.fit(x, y)?;
        Ok(FittedModel::LinearRegression(model))
    }
}

/// Linear regression model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    config: LinearRegressionConfig,
    /// Fitted coefficients (weights)
    coefficients: Option<Array1<f64>>,
    /// Fitted intercept (bias)
    intercept: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new(LinearRegressionConfig::default())
    }
}

impl LinearRegression {
    pub fn new(config: LinearRegressionConfig) -> Self {
        Self {
            config,
            coefficients: None,
            intercept: 0.0,
        }
    }

    /// Fit the model to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_fit_input(x, y)?;

        let (x_centered, y_centered, means) = if self.config.fit_intercept {
            let x_mean = x
                .mean_axis(Axis(0))
                .ok_or_else(|| ModelError::ValidationError("empty feature matrix".to_string()))?;
            let y_mean = y.mean().unwrap_or(0.0);
            let x_centered = x - &x_mean.view().insert_axis(Axis(0));
            let y_centered = y - y_mean;
            (x_centered, y_centered, Some((x_mean, y_mean)))
        } else {
            (x.clone(), y.clone(), None)
        };

        let coefficients = solve_least_squares(&x_centered, &y_centered).ok_or_else(|| {
            ModelError::ComputationError(
                "Matrix is singular, cannot solve least squares".to_string(),
            )
        })?;

        self.intercept = match means {
            Some((x_mean, y_mean)) => y_mean - coefficients.dot(&x_mean),
            None => 0.0,
        };
        self.coefficients = Some(coefficients);

        Ok(self)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(ModelError::ModelNotFitted)?;
        check_n_features(coefficients.len(), x)?;
        Ok(x.dot(coefficients) + self.intercept)
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.as_ref().map_or(0, |c| c.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_exact_linear_fit() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 4.0], [4.0, 3.0], [5.0, 5.0]];
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| -1.0 * v) + 3.0;

        let mut model = LinearRegression::default();
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-8);
        assert!((coef[1] + 1.0).abs() < 1e-8);
        assert!((model.intercept() - 3.0).abs() < 1e-8);

        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-8);
        }
    }

    #[test]
    fn test_without_intercept() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![2.0, 4.0, 6.0];
        let mut model = LinearRegression::new(LinearRegressionConfig { fit_intercept: false });
        model.fit(&x, &y).unwrap();
        assert!((model.coefficients().unwrap()[0] - 2.0).abs() < 1e-10);
        assert_eq!(model.intercept(), 0.0);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::default();
        let x = array![[1.0]];
        assert!(matches!(model.predict(&x), Err(ModelError::ModelNotFitted)));
    }

    #[test]
    fn test_predict_wrong_width() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 5.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut model = LinearRegression::default();
        model.fit(&x, &y).unwrap();
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(ModelError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_label_length_mismatch() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        let mut model = LinearRegression::default();
        assert!(matches!(model.fit(&x, &y), Err(ModelError::ShapeError { .. })));
    }

    #[test]
    fn test_unknown_param_rejected() {
        let config = LinearRegressionConfig::default();
        let params = ParamSet::new().with("alpha", 1.0);
        assert!(matches!(
            config.with_params(&params),
            Err(ModelError::InvalidParameter { .. })
        ));
    }
}
