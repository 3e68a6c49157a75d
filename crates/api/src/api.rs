//! HTTP API: prediction, log queries, health and Prometheus metrics

use crate::assets;
use axum::{
    body::Bytes,
    extract::{MatchedPath, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use housing_lib::{
    health::HealthRegistry,
    logging::{self, DEFAULT_TAIL_LINES},
    observability::ServiceMetrics,
    predictor::{PredictionService, ServiceError},
    schema::{Constraint, FieldViolation, ValidationErrors},
    store::{StoreError, DEFAULT_LOG_LIMIT},
    PredictionLogEntry,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
    pub health_registry: HealthRegistry,
    pub metrics: ServiceMetrics,
    /// Text log tailed by `/logs`
    pub log_file: PathBuf,
}

impl AppState {
    pub fn new(
        service: PredictionService,
        health_registry: HealthRegistry,
        metrics: ServiceMetrics,
        log_file: PathBuf,
    ) -> Self {
        Self {
            service,
            health_registry,
            metrics,
            log_file,
        }
    }
}

/// Error body: `{"error": {"type", "message", "details"?}}`
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationErrors),
    Service(ServiceError),
    Store(StoreError),
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(v) => ApiError::Validation(v),
            other => ApiError::Service(other),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message, details) = match self {
            ApiError::Validation(v) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                v.to_string(),
                Some(v.violations),
            ),
            ApiError::Service(e) => {
                let kind = match e {
                    ServiceError::Storage(_) => "storage_error",
                    _ => "inference_error",
                };
                (StatusCode::INTERNAL_SERVER_ERROR, kind, e.to_string(), None)
            }
            ApiError::Store(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                e.to_string(),
                None,
            ),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None)
            }
        };

        if status.is_server_error() {
            error!(error_type = kind, message = %message, "Request failed");
        }

        let mut body = json!({ "type": kind, "message": message });
        if let Some(details) = details {
            body["details"] = json!(details);
        }
        (status, Json(json!({ "error": body }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct LinesQuery {
    pub lines: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

/// One row of `/logs/db`
#[derive(Debug, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp: String,
    pub prediction: f64,
    pub latency_ms: f64,
}

impl From<&PredictionLogEntry> for LogRow {
    fn from(entry: &PredictionLogEntry) -> Self {
        Self {
            timestamp: entry.timestamp.clone(),
            prediction: entry.prediction,
            latency_ms: (entry.latency_ms * 100.0).round() / 100.0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub count: usize,
    pub logs: Vec<LogRow>,
}

/// Liveness: always ok while the process serves requests
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn predict(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let value: Value = serde_json::from_slice(&body).map_err(|e| {
        state.metrics.inc_validation_failures();
        ApiError::Validation(ValidationErrors {
            violations: vec![FieldViolation {
                field: "body".to_string(),
                constraint: Constraint::WrongType,
                message: format!("body is not valid JSON: {}", e),
            }],
        })
    })?;

    let outcome = state.service.predict_value(&value).await?;
    Ok(Json(outcome))
}

async fn logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LinesQuery>,
) -> Result<Response, ApiError> {
    let lines = query.lines.unwrap_or(DEFAULT_TAIL_LINES);
    let path = state.log_file.clone();
    let tail = tokio::task::spawn_blocking(move || logging::tail_lines(path, lines))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(format!("failed to read log file: {}", e)))?;

    let text = tail.unwrap_or_else(|| "No logs found.".to_string());
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response())
}

async fn recent_rows(
    state: &AppState,
    limit: Option<u32>,
) -> Result<Vec<PredictionLogEntry>, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Ok(state.service.store().recent_predictions(limit).await?)
}

async fn logs_db(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let rows = recent_rows(&state, query.limit).await?;
    let logs: Vec<LogRow> = rows.iter().map(LogRow::from).collect();
    Ok(Json(LogsResponse {
        count: logs.len(),
        logs,
    }))
}

async fn logs_db_html(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Html<String>, ApiError> {
    let rows = recent_rows(&state, query.limit).await?;
    Ok(Html(render_log_table(&rows)))
}

fn render_log_table(rows: &[PredictionLogEntry]) -> String {
    let mut html = String::from(
        "<h2>Recent Prediction Logs</h2><table border='1'>\
         <tr><th>Timestamp</th><th>Prediction</th><th>Latency (ms)</th></tr>",
    );
    for row in rows {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{:.2}</td><td>{:.2}</td></tr>",
            row.timestamp, row.prediction, row.latency_ms
        ));
    }
    html.push_str("</table>");
    html
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let text = state
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], text).into_response())
}

/// Count and time every routed request by its route template
async fn track_metrics(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = req.method().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    state.metrics.observe_http_request(
        &method,
        &route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(assets::index))
        .route("/static/*path", get(assets::static_asset))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/predict", post(predict))
        .route("/logs", get(logs))
        .route("/logs/db", get(logs_db))
        .route("/logs/db/html", get(logs_db_html))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_metrics))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests
pub async fn serve<F>(addr: SocketAddr, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("API server stopped");
    Ok(())
}
