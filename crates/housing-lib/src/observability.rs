//! Observability infrastructure for the housing service
//!
//! Provides:
//! - Prometheus metrics (HTTP traffic, prediction latency, errors, model info)
//! - Structured logging of domain events with tracing

use crate::evaluation::RegressionMetrics;
use prometheus::{
    register_gauge_vec, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Encoder, GaugeVec, Histogram, HistogramVec, IntCounter,
    IntCounterVec, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for prediction latency (in seconds)
const PREDICTION_BUCKETS: &[f64] = &[
    0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Histogram buckets for whole HTTP requests (in seconds)
const HTTP_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<Option<ServiceMetricsInner>> = OnceLock::new();

struct ServiceMetricsInner {
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounter,
    prediction_errors_total: IntCounterVec,
    validation_failures_total: IntCounter,
    model_info: GaugeVec,
}

impl ServiceMetricsInner {
    fn register() -> prometheus::Result<Self> {
        Ok(Self {
            http_requests_total: register_int_counter_vec!(
                "housing_http_requests_total",
                "HTTP requests by route, method and status",
                &["method", "route", "status"]
            )?,

            http_request_duration_seconds: register_histogram_vec!(
                "housing_http_request_duration_seconds",
                "HTTP request latency by route and method",
                &["method", "route"],
                HTTP_BUCKETS.to_vec()
            )?,

            prediction_latency_seconds: register_histogram!(
                "housing_prediction_latency_seconds",
                "Time spent transforming and scoring one record",
                PREDICTION_BUCKETS.to_vec()
            )?,

            predictions_total: register_int_counter!(
                "housing_predictions_total",
                "Total number of served predictions"
            )?,

            prediction_errors_total: register_int_counter_vec!(
                "housing_prediction_errors_total",
                "Failed predictions by error kind",
                &["kind"]
            )?,

            validation_failures_total: register_int_counter!(
                "housing_validation_failures_total",
                "Requests rejected by feature validation"
            )?,

            model_info: register_gauge_vec!(
                "housing_model_info",
                "Information about the loaded model artifact",
                &["model", "version"]
            )?,
        })
    }
}

/// Service metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
/// If registration fails the handle records nothing.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a new metrics handle (registers global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(|| match ServiceMetricsInner::register() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Failed to register metrics, recording disabled");
                None
            }
        });
        Self { _private: () }
    }

    fn inner(&self) -> Option<&ServiceMetricsInner> {
        GLOBAL_METRICS.get().and_then(Option::as_ref)
    }

    /// Record one finished HTTP request
    pub fn observe_http_request(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        if let Some(m) = self.inner() {
            let status = status.to_string();
            m.http_requests_total
                .with_label_values(&[method, route, status.as_str()])
                .inc();
            m.http_request_duration_seconds
                .with_label_values(&[method, route])
                .observe(duration_secs);
        }
    }

    /// Record a served prediction
    pub fn observe_prediction(&self, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.prediction_latency_seconds.observe(duration_secs);
            m.predictions_total.inc();
        }
    }

    /// Increment prediction errors for `kind` (`inference`, `storage`)
    pub fn inc_prediction_errors(&self, kind: &str) {
        if let Some(m) = self.inner() {
            m.prediction_errors_total.with_label_values(&[kind]).inc();
        }
    }

    pub fn inc_validation_failures(&self) {
        if let Some(m) = self.inner() {
            m.validation_failures_total.inc();
        }
    }

    /// Publish the loaded model's identity
    pub fn set_model_info(&self, model: &str, version: &str) {
        if let Some(m) = self.inner() {
            m.model_info.reset();
            m.model_info.with_label_values(&[model, version]).set(1.0);
        }
    }

    /// Encode every registered metric in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for service events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log a served prediction; the message is the line `/logs` shows
    pub fn log_prediction(&self, prediction: f64, latency_ms: f64, model_version: &str) {
        info!(
            event = "prediction_served",
            service = %self.service,
            model_version = %model_version,
            "pred={:.2} | latency_ms={:.1}",
            prediction,
            latency_ms
        );
    }

    /// Log a rejected request body
    pub fn log_validation_failure(&self, fields: &[String]) {
        warn!(
            event = "validation_failed",
            service = %self.service,
            fields = ?fields,
            "Rejected invalid feature record"
        );
    }

    /// Log a failed prediction
    pub fn log_prediction_failure(&self, kind: &str, error: &str) {
        warn!(
            event = "prediction_failed",
            service = %self.service,
            kind = %kind,
            error = %error,
            "Prediction failed"
        );
    }

    /// Log a completed training run
    pub fn log_training_run(&self, model: &str, metrics: &RegressionMetrics, artifact_path: &Path) {
        info!(
            event = "model_trained",
            service = %self.service,
            model = %model,
            n_test = metrics.n_samples,
            artifact = %artifact_path.display(),
            "Saved model {} | r2={:.4}, rmse={:.2}, mae={:.2}",
            artifact_path.display(),
            metrics.r2,
            metrics.rmse,
            metrics.mae
        );
    }

    /// Log an evaluation of a saved artifact
    pub fn log_evaluation(&self, model_version: &str, metrics: &RegressionMetrics) {
        info!(
            event = "model_evaluated",
            service = %self.service,
            model_version = %model_version,
            n_test = metrics.n_samples,
            "Evaluation | R2={:.4} RMSE={:.2} MAE={:.2}",
            metrics.r2,
            metrics.rmse,
            metrics.mae
        );
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, model_version: &str, addr: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            service_version = %version,
            model_version = %model_version,
            addr = %addr,
            "Housing price service started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Housing price service shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_metrics_render() {
        let metrics = ServiceMetrics::new();
        metrics.observe_http_request("GET", "/health", 200, 0.001);
        metrics.observe_prediction(0.002);
        metrics.inc_prediction_errors("inference");
        metrics.inc_validation_failures();
        metrics.set_model_info("linreg", "linreg-abc");

        let text = metrics.render().unwrap();
        assert!(text.contains("housing_predictions_total"));
        assert!(text.contains("housing_model_info{model=\"linreg\",version=\"linreg-abc\"} 1"));
    }

    #[test]
    fn test_handles_share_registry() {
        let a = ServiceMetrics::new();
        let b = a.clone();
        a.inc_validation_failures();
        b.inc_validation_failures();
        assert!(b.render().unwrap().contains("housing_validation_failures_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("housing-api");
        assert_eq!(logger.service, "housing-api");
        logger.log_prediction(1.0, 0.5, "linreg-abc");
    }
}
