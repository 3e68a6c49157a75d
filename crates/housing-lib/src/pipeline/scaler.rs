//! Standard scaling: (x - mean) / std

use serde::{Deserialize, Serialize};

/// Per-column z-score scaler
///
/// Uses the population standard deviation. Constant columns keep a scale
/// of 1 so they map to zero instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl StandardScaler {
    /// Fit on column-major data without missing values
    pub fn fit(columns: &[Vec<f64>]) -> Self {
        let (means, scales) = columns
            .iter()
            .map(|column| {
                let n = column.len().max(1) as f64;
                let mean = column.iter().sum::<f64>() / n;
                let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                let scale = if std > f64::EPSILON { std } else { 1.0 };
                (mean, scale)
            })
            .unzip();
        Self { means, scales }
    }

    pub fn transform_value(&self, column: usize, value: f64) -> f64 {
        (value - self.means[column]) / self.scales[column]
    }
}
