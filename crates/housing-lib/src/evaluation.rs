//! Regression metrics

use serde::{Deserialize, Serialize};

/// Goodness-of-fit for a set of predictions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub n_samples: usize,
}

impl RegressionMetrics {
    /// Compute metrics for paired truth and predictions
    ///
    /// Returns `None` when the slices are empty or differ in length. R² is
    /// 0 when the truth has no variance and the fit is not exact.
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Option<Self> {
        let n = y_true.len();
        if n == 0 || n != y_pred.len() {
            return None;
        }

        let mean = y_true.iter().sum::<f64>() / n as f64;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        let mut abs_sum = 0.0;
        for (t, p) in y_true.iter().zip(y_pred) {
            let err = t - p;
            ss_res += err * err;
            abs_sum += err.abs();
            ss_tot += (t - mean) * (t - mean);
        }

        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Some(Self {
            r2,
            rmse: (ss_res / n as f64).sqrt(),
            mae: abs_sum / n as f64,
            n_samples: n,
        })
    }
}
