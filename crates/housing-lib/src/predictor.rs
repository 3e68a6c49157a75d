//! Prediction service
//!
//! Runs one validated record through the loaded model, measures latency and
//! appends a log row. A call either fully succeeds (outcome returned and
//! row written) or fails without writing anything.

use crate::estimator::EstimatorError;
use crate::health::{components, HealthRegistry};
use crate::models::PredictionOutcome;
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::pipeline::PipelineError;
use crate::schema::{FeatureRecord, FeatureRow, ValidationErrors};
use crate::store::{LogStore, StoreError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors raised while scoring rows
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("preprocessing failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("estimator failed: {0}")]
    Estimator(#[from] EstimatorError),

    #[error("model returned {actual} outputs for {expected} rows")]
    OutputCount { expected: usize, actual: usize },

    #[error("model returned a non-finite prediction ({0})")]
    NonFinite(f64),

    #[error("{0}")]
    Model(String),
}

/// Anything that can score feature rows
pub trait Predictor: Send + Sync {
    /// One prediction per input row
    fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, InferenceError>;

    /// Identifier of the loaded model
    fn model_version(&self) -> &str;
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("failed to write prediction log: {0}")]
    Storage(#[from] StoreError),
}

impl ServiceError {
    /// Label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::Inference(_) => "inference",
            ServiceError::Storage(_) => "storage",
        }
    }
}

/// Serves predictions from one model into one log store
#[derive(Clone)]
pub struct PredictionService {
    predictor: Arc<dyn Predictor>,
    store: LogStore,
    metrics: ServiceMetrics,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl PredictionService {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        store: LogStore,
        metrics: ServiceMetrics,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            predictor,
            store,
            metrics,
            health,
            logger,
        }
    }

    pub fn model_version(&self) -> &str {
        self.predictor.model_version()
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// Validate an untyped body, then predict
    pub async fn predict_value(&self, body: &Value) -> Result<PredictionOutcome, ServiceError> {
        let record = FeatureRecord::from_value(body).map_err(|errors| self.reject(errors))?;
        self.predict(record).await
    }

    /// Score one record and log it
    ///
    /// Typed records are bounds-checked again before they reach the model.
    pub async fn predict(&self, record: FeatureRecord) -> Result<PredictionOutcome, ServiceError> {
        record.validate().map_err(|errors| self.reject(errors))?;
        let start = Instant::now();

        let prediction = match self.score(&record.to_row()) {
            Ok(p) => p,
            Err(e) => {
                self.health.set_degraded(components::MODEL, e.to_string()).await;
                return Err(self.fail(ServiceError::Inference(e)));
            }
        };
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = self.store.record_prediction(record, prediction, latency_ms).await {
            self.health.set_unhealthy(components::LOG_STORE, e.to_string()).await;
            return Err(self.fail(ServiceError::Storage(e)));
        }

        self.health.recover(components::MODEL).await;
        self.health.recover(components::LOG_STORE).await;
        self.metrics.observe_prediction(latency_ms / 1000.0);
        self.logger
            .log_prediction(prediction, latency_ms, self.predictor.model_version());

        Ok(PredictionOutcome {
            prediction,
            latency_ms,
        })
    }

    fn score(&self, row: &FeatureRow) -> Result<f64, InferenceError> {
        let outputs = self.predictor.predict(std::slice::from_ref(row))?;
        match outputs.as_slice() {
            [p] if p.is_finite() => Ok(*p),
            [p] => Err(InferenceError::NonFinite(*p)),
            other => Err(InferenceError::OutputCount {
                expected: 1,
                actual: other.len(),
            }),
        }
    }

    fn reject(&self, errors: ValidationErrors) -> ValidationErrors {
        self.metrics.inc_validation_failures();
        let fields: Vec<String> = errors.violations.iter().map(|v| v.field.clone()).collect();
        self.logger.log_validation_failure(&fields);
        errors
    }

    fn fail(&self, error: ServiceError) -> ServiceError {
        self.metrics.inc_prediction_errors(error.kind());
        self.logger.log_prediction_failure(error.kind(), &error.to_string());
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use serde_json::json;

    struct FixedPredictor(f64);

    impl Predictor for FixedPredictor {
        fn predict(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, InferenceError> {
            Ok(vec![self.0; rows.len()])
        }

        fn model_version(&self) -> &str {
            "stub-1"
        }
    }

    struct FailingPredictor;

    impl Predictor for FailingPredictor {
        fn predict(&self, _rows: &[FeatureRow]) -> Result<Vec<f64>, InferenceError> {
            Err(InferenceError::Model("boom".to_string()))
        }

        fn model_version(&self) -> &str {
            "stub-broken"
        }
    }

    fn body() -> Value {
        json!({
            "longitude": -122.1,
            "latitude": 37.5,
            "housing_median_age": 30,
            "total_rooms": 2000,
            "total_bedrooms": 400,
            "population": 900,
            "households": 350,
            "median_income": 4.5,
            "ocean_proximity": "NEAR BAY"
        })
    }

    async fn service(predictor: Arc<dyn Predictor>) -> (PredictionService, HealthRegistry) {
        let health = HealthRegistry::new();
        health.register(components::MODEL).await;
        health.register(components::LOG_STORE).await;
        let svc = PredictionService::new(
            predictor,
            LogStore::open_in_memory().unwrap(),
            ServiceMetrics::new(),
            health.clone(),
            StructuredLogger::new("test"),
        );
        (svc, health)
    }

    #[tokio::test]
    async fn test_prediction_is_logged() {
        let (svc, _) = service(Arc::new(FixedPredictor(250_000.0))).await;
        let outcome = svc.predict_value(&body()).await.unwrap();

        assert_eq!(outcome.prediction, 250_000.0);
        assert!(outcome.latency_ms >= 0.0);

        let rows = svc.store().recent_predictions(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prediction, 250_000.0);
        assert_eq!(rows[0].record.median_income, 4.5);
        assert_eq!(rows[0].latency_ms, outcome.latency_ms);
    }

    #[tokio::test]
    async fn test_invalid_body_writes_nothing() {
        let (svc, _) = service(Arc::new(FixedPredictor(1.0))).await;
        let mut bad = body();
        bad["latitude"] = json!(99);

        let err = svc.predict_value(&bad).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(svc.store().count_predictions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inference_failure_writes_nothing() {
        let (svc, health) = service(Arc::new(FailingPredictor)).await;
        let err = svc.predict_value(&body()).await.unwrap_err();

        assert_eq!(err.kind(), "inference");
        assert_eq!(svc.store().count_predictions().await.unwrap(), 0);
        let status = health.health().await.components[components::MODEL].status;
        assert_eq!(status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_non_finite_prediction_is_an_error() {
        let (svc, _) = service(Arc::new(FixedPredictor(f64::NAN))).await;
        let err = svc.predict_value(&body()).await.unwrap_err();

        assert!(matches!(err, ServiceError::Inference(InferenceError::NonFinite(_))));
        assert_eq!(svc.store().count_predictions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_success_recovers_model_health() {
        let (svc, health) = service(Arc::new(FixedPredictor(3.0))).await;
        health.set_degraded(components::MODEL, "earlier failure").await;

        svc.predict_value(&body()).await.unwrap();
        assert_eq!(health.health().await.status, ComponentStatus::Healthy);
        assert_eq!(svc.model_version(), "stub-1");
    }

    #[tokio::test]
    async fn test_typed_record_out_of_bounds_is_rejected() {
        let (svc, _) = service(Arc::new(FixedPredictor(1.0))).await;
        let mut record = FeatureRecord::from_value(&body()).unwrap();
        record.longitude = -130.0;

        let err = svc.predict(record).await.unwrap_err();
        match err {
            ServiceError::Validation(errors) => assert!(errors.has_field("longitude")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(svc.store().count_predictions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_marks_log_store_unhealthy() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("app.db");
        let health = HealthRegistry::new();
        health.register(components::MODEL).await;
        health.register(components::LOG_STORE).await;
        health.set_ready(true).await;
        let svc = PredictionService::new(
            Arc::new(FixedPredictor(5.0)),
            LogStore::open(&db_path).unwrap(),
            ServiceMetrics::new(),
            health.clone(),
            StructuredLogger::new("test"),
        );

        rusqlite::Connection::open(&db_path)
            .unwrap()
            .execute_batch("DROP TABLE api_logs;")
            .unwrap();

        let err = svc.predict_value(&body()).await.unwrap_err();
        assert_eq!(err.kind(), "storage");
        assert!(matches!(err, ServiceError::Storage(_)));

        let report = health.health().await;
        assert_eq!(report.components[components::LOG_STORE].status, ComponentStatus::Unhealthy);
        assert!(!health.readiness().await.ready);
    }
}
