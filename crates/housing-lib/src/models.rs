//! Core data models for the housing service

use crate::schema::FeatureRecord;
use serde::{Deserialize, Serialize};

/// Result of one served prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub prediction: f64,
    pub latency_ms: f64,
}

/// One row of the prediction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogEntry {
    pub id: i64,
    pub timestamp: String,
    pub record: FeatureRecord,
    pub prediction: f64,
    pub latency_ms: f64,
}

/// One row of the training run log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRunEntry {
    pub id: i64,
    pub timestamp: String,
    pub model: String,
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Serialized hyperparameters (JSON text)
    pub params: String,
}

/// Data for a training run before the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrainingRun {
    pub model: String,
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub params: String,
}
