//! Ordinary least squares regression

use super::{EstimatorError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Hyperparameters for [`LinearRegression`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub fit_intercept: bool,
    /// Relative diagonal jitter added to the normal equations. Keeps the
    /// system solvable when one-hot columns are collinear with the intercept.
    pub ridge: f64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            ridge: 1e-8,
        }
    }
}

/// Fitted linear model: y = x · coefficients + intercept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegression {
    /// Solve the normal equations on centered data
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, params: &LinearParams) -> Result<Self> {
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() {
            return Err(EstimatorError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(EstimatorError::EmptyInput);
        }
        if params.ridge < 0.0 || !params.ridge.is_finite() {
            return Err(EstimatorError::InvalidParameter {
                name: "ridge".to_string(),
                reason: format!("must be a non-negative finite number, got {}", params.ridge),
            });
        }

        let (x_fit, y_fit, x_mean, y_mean) = if params.fit_intercept {
            let x_mean = x.mean_axis(Axis(0)).ok_or(EstimatorError::EmptyInput)?;
            let y_mean = y.mean().ok_or(EstimatorError::EmptyInput)?;
            let x_centered = x - &x_mean.view().insert_axis(Axis(0));
            let y_centered = y - y_mean;
            (x_centered, y_centered, x_mean, y_mean)
        } else {
            (x.clone(), y.clone(), Array1::zeros(n_features), 0.0)
        };

        let mut xtx = x_fit.t().dot(&x_fit);
        let xty = x_fit.t().dot(&y_fit);

        let mean_diag = xtx.diag().sum() / n_features.max(1) as f64;
        let jitter = params.ridge * mean_diag.max(1.0);
        for i in 0..n_features {
            xtx[[i, i]] += jitter;
        }

        let coefficients = cholesky_solve(&xtx, &xty).ok_or(EstimatorError::Singular)?;
        let intercept = if params.fit_intercept {
            y_mean - coefficients.dot(&x_mean)
        } else {
            0.0
        };

        Ok(Self {
            coefficients: coefficients.to_vec(),
            intercept,
        })
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        row.iter()
            .zip(&self.coefficients)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + self.intercept
    }
}

/// Solve the symmetric positive-definite system `a · x = b` via Cholesky
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L · Lᵀ
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L · z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // Lᵀ · x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    Some(x)
}
