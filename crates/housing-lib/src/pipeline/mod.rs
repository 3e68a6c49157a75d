//! Preprocessing transform for housing rows
//!
//! Numeric columns are median-imputed then standard-scaled; the categorical
//! column is most-frequent-imputed then one-hot encoded. The fitted state is
//! plain data so it can be persisted inside the model artifact.

mod encoder;
mod imputer;
mod scaler;

pub use encoder::OneHotEncoder;
pub use imputer::{MedianImputer, MostFrequentImputer};
pub use scaler::StandardScaler;

use crate::schema::{FeatureRow, CATEGORICAL_FEATURE, NUMERIC_FEATURES, NUM_NUMERIC};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while fitting or applying the preprocessor
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot fit on an empty dataset")]
    EmptyInput,

    #[error("column '{0}' has no observed values")]
    AllMissing(String),

    #[error("invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Fitted column transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numeric_imputer: MedianImputer,
    pub scaler: StandardScaler,
    pub category_imputer: MostFrequentImputer,
    pub encoder: OneHotEncoder,
}

impl Preprocessor {
    /// Fit every step on the training rows
    pub fn fit(rows: &[FeatureRow]) -> Result<Self> {
        if rows.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let raw_columns: Vec<Vec<f64>> = (0..NUM_NUMERIC)
            .map(|c| rows.iter().map(|r| r.numeric[c]).collect())
            .collect();
        let numeric_imputer = MedianImputer::fit(&raw_columns, &NUMERIC_FEATURES)?;

        let imputed_columns: Vec<Vec<f64>> = raw_columns
            .into_iter()
            .enumerate()
            .map(|(c, column)| {
                column
                    .into_iter()
                    .map(|v| numeric_imputer.transform_value(c, v))
                    .collect()
            })
            .collect();
        let scaler = StandardScaler::fit(&imputed_columns);

        let category_imputer = MostFrequentImputer::fit(
            rows.iter().map(|r| r.category.as_deref()),
            CATEGORICAL_FEATURE,
        )?;
        let encoder = OneHotEncoder::fit(
            rows.iter()
                .map(|r| category_imputer.transform_value(r.category.as_deref())),
        );

        Ok(Self {
            numeric_imputer,
            scaler,
            category_imputer,
            encoder,
        })
    }

    /// Width of the transformed design matrix
    pub fn n_output_features(&self) -> usize {
        NUM_NUMERIC + self.encoder.width()
    }

    /// Verify the fitted state has the widths `transform` indexes by
    pub fn check_shape(&self) -> Result<()> {
        let widths = [
            ("medians", self.numeric_imputer.medians.len()),
            ("means", self.scaler.means.len()),
            ("scales", self.scaler.scales.len()),
        ];
        for (name, len) in widths {
            if len != NUM_NUMERIC {
                return Err(PipelineError::ShapeError {
                    expected: format!("{} {}", NUM_NUMERIC, name),
                    actual: format!("{} {}", len, name),
                });
            }
        }
        if !self.encoder.categories.windows(2).all(|w| w[0] < w[1]) {
            return Err(PipelineError::ShapeError {
                expected: "sorted, unique categories".to_string(),
                actual: format!("{:?}", self.encoder.categories),
            });
        }
        Ok(())
    }

    /// Transform rows into the design matrix
    pub fn transform(&self, rows: &[FeatureRow]) -> Result<Array2<f64>> {
        self.check_shape()?;
        let width = self.n_output_features();

        let mut out = Array2::zeros((rows.len(), width));
        for (i, row) in rows.iter().enumerate() {
            let mut target = out.row_mut(i);
            let cells = target
                .as_slice_mut()
                .ok_or_else(|| PipelineError::ShapeError {
                    expected: "contiguous row".to_string(),
                    actual: "strided row".to_string(),
                })?;

            for (c, value) in row.numeric.iter().enumerate() {
                let imputed = self.numeric_imputer.transform_value(c, *value);
                cells[c] = self.scaler.transform_value(c, imputed);
            }
            let category = self.category_imputer.transform_value(row.category.as_deref());
            self.encoder.encode_into(category, &mut cells[NUM_NUMERIC..]);
        }
        Ok(out)
    }
}
