//! Housing price regression library
//!
//! This crate provides the core functionality for:
//! - Feature schema validation
//! - Preprocessing and regression estimators
//! - Versioned model artifacts, training and evaluation
//! - The prediction service and its SQLite log store
//! - Health checks and observability

pub mod artifact;
pub mod dataset;
pub mod estimator;
pub mod evaluation;
pub mod health;
pub mod logging;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;
pub mod schema;
pub mod store;
pub mod training;

pub use artifact::{ArtifactError, ModelArtifact, ARTIFACT_FORMAT_VERSION};
pub use estimator::{Hyperparameters, ModelKind};
pub use evaluation::RegressionMetrics;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use predictor::{InferenceError, PredictionService, Predictor, ServiceError};
pub use schema::{FeatureRecord, OceanProximity, ValidationErrors};
pub use store::{LogStore, SqliteStore, StoreError, DEFAULT_LOG_LIMIT};
pub use training::{evaluate, train, EvaluationReport, TrainConfig, TrainingError, TrainingOutcome};
