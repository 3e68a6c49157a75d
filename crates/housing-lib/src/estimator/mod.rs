//! Regression estimators
//!
//! The set of trainable models is fixed: ordinary least squares (`linreg`)
//! and a random forest (`rf`). Both are plain serializable data once fitted.

mod forest;
mod linear;

pub use forest::{ForestParams, RandomForest, RegressionTree, TreeNode};
pub use linear::{LinearParams, LinearRegression};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while fitting or applying an estimator
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("cannot fit on an empty dataset")]
    EmptyInput,

    #[error("invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("normal equations are singular")]
    Singular,

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("malformed model: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, EstimatorError>;

/// Selector for the trainable model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "linreg")]
    LinearRegression,
    #[serde(rename = "rf")]
    RandomForest,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::LinearRegression, ModelKind::RandomForest];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "linreg",
            ModelKind::RandomForest => "rf",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown model '{}', expected one of: linreg, rf", s))
    }
}

/// Hyperparameters for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model")]
pub enum Hyperparameters {
    #[serde(rename = "linreg")]
    Linear(LinearParams),
    #[serde(rename = "rf")]
    Forest(ForestParams),
}

impl Hyperparameters {
    pub fn defaults_for(kind: ModelKind) -> Self {
        match kind {
            ModelKind::LinearRegression => Hyperparameters::Linear(LinearParams::default()),
            ModelKind::RandomForest => Hyperparameters::Forest(ForestParams::default()),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Hyperparameters::Linear(_) => ModelKind::LinearRegression,
            Hyperparameters::Forest(_) => ModelKind::RandomForest,
        }
    }
}

/// A fitted estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Estimator {
    #[serde(rename = "linreg")]
    Linear(LinearRegression),
    #[serde(rename = "rf")]
    Forest(RandomForest),
}

impl Estimator {
    pub fn fit(params: &Hyperparameters, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        match params {
            Hyperparameters::Linear(p) => Ok(Estimator::Linear(LinearRegression::fit(x, y, p)?)),
            Hyperparameters::Forest(p) => Ok(Estimator::Forest(RandomForest::fit(x, y, p)?)),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Estimator::Linear(_) => ModelKind::LinearRegression,
            Estimator::Forest(_) => ModelKind::RandomForest,
        }
    }

    /// Width of the design matrix the estimator was fitted on
    pub fn n_features(&self) -> usize {
        match self {
            Estimator::Linear(m) => m.n_features(),
            Estimator::Forest(m) => m.n_features,
        }
    }

    /// Verify the fitted state can be evaluated without out-of-bounds access
    pub fn check_structure(&self) -> Result<()> {
        match self {
            Estimator::Linear(_) => Ok(()),
            Estimator::Forest(m) => m.check_structure(),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features() {
            return Err(EstimatorError::ShapeError {
                expected: format!("{} columns", self.n_features()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let predictions = match self {
            Estimator::Linear(m) => x.rows().into_iter().map(|r| m.predict_row(r)).collect(),
            Estimator::Forest(m) => x.rows().into_iter().map(|r| m.predict_row(r)).collect(),
        };
        Ok(predictions)
    }
}
