//! Integration tests for the housing API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use housing_api::{create_router, AppState};
use housing_lib::{
    health::{components, HealthRegistry},
    observability::{ServiceMetrics, StructuredLogger},
    LogStore, ModelArtifact, ModelKind, PredictionService, TrainConfig,
};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const CATEGORIES: [&str; 5] = ["<1H OCEAN", "INLAND", "ISLAND", "NEAR BAY", "NEAR OCEAN"];

/// target = 40000 * income + 30000 * category index + 2 * rooms + 100000
fn write_training_csv(dir: &Path) -> PathBuf {
    let mut s = String::from(
        "longitude,latitude,housing_median_age,total_rooms,total_bedrooms,population,\
         households,median_income,ocean_proximity,median_house_value\n",
    );
    for i in 0..300usize {
        let income = 0.5 + ((i * 29) % 140) as f64 * 0.1;
        let rooms = 500 + (i * 131) % 5000;
        let category = (i * 7) % CATEGORIES.len();
        let value = 40_000.0 * income + 30_000.0 * category as f64 + 2.0 * rooms as f64 + 100_000.0;
        writeln!(
            s,
            "{},{},{},{},{},{},{},{},{},{}",
            -124.0 + ((i * 37) % 100) as f64 * 0.1,
            33.0 + ((i * 53) % 90) as f64 * 0.1,
            (i * 17) % 52,
            rooms,
            100 + (i * 71) % 1000,
            300 + (i * 97) % 3000,
            100 + (i * 59) % 900,
            income,
            CATEGORIES[category],
            value
        )
        .unwrap();
    }
    let path = dir.join("housing.csv");
    std::fs::write(&path, s).unwrap();
    path
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    db_path: PathBuf,
    _temp_dir: TempDir,
}

impl TestApp {
    async fn request(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.get(uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_predict(&self, body: impl Into<Body>) -> (StatusCode, Value) {
        let (status, body) = self
            .request(
                Request::builder()
                    .method("POST")
                    .uri("/predict")
                    .header("content-type", "application/json")
                    .body(body.into())
                    .unwrap(),
            )
            .await;
        (status, serde_json::from_slice(&body).unwrap())
    }
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let data = write_training_csv(temp_dir.path());
    let config = TrainConfig::new(
        ModelKind::LinearRegression,
        &data,
        temp_dir.path().join("models"),
        temp_dir.path().join("db").join("app.db"),
    );
    let outcome = housing_lib::train(&config).unwrap();
    let artifact = ModelArtifact::load(&outcome.artifact_path).unwrap();

    let health_registry = HealthRegistry::new();
    health_registry.register(components::MODEL).await;
    health_registry.register(components::LOG_STORE).await;

    let metrics = ServiceMetrics::new();
    let store = LogStore::open(&config.db_path).unwrap();
    let service = PredictionService::new(
        Arc::new(artifact),
        store,
        metrics.clone(),
        health_registry.clone(),
        StructuredLogger::new("test"),
    );
    let state = Arc::new(AppState::new(
        service,
        health_registry,
        metrics,
        temp_dir.path().join("logs").join("app.log"),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db_path: config.db_path.clone(),
        _temp_dir: temp_dir,
    }
}

fn sample_record() -> Value {
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

fn body_of(value: &Value) -> Body {
    Body::from(serde_json::to_vec(value).unwrap())
}

#[tokio::test]
async fn test_health_always_ok() {
    let app = setup_test_app().await;
    app.state
        .health_registry
        .set_unhealthy(components::LOG_STORE, "locked")
        .await;

    let (status, body) = app.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_ready_reflects_registry() {
    let app = setup_test_app().await;

    let (status, body) = app.get_json("/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    app.state.health_registry.set_ready(true).await;
    let (status, body) = app.get_json("/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert!(body["health"]["components"]["model"].is_object());
    assert!(body["health"]["components"]["log_store"].is_object());
}

#[tokio::test]
async fn test_sample_record_predicts_and_logs() {
    let app = setup_test_app().await;

    let (status, body) = app.post_predict(body_of(&sample_record())).await;
    assert_eq!(status, StatusCode::OK);

    // 40000 * 4.5 + 30000 * 3 + 2 * 2000 + 100000
    let prediction = body["prediction"].as_f64().unwrap();
    assert!((prediction - 374_000.0).abs() < 100.0, "prediction {}", prediction);
    assert!(body["latency_ms"].as_f64().unwrap() >= 0.0);

    let rows = app.state.service.store().recent_predictions(1).await.unwrap();
    assert_eq!(rows.len(), 1);
    let logged = &rows[0];
    assert_eq!(logged.prediction, prediction);
    assert_eq!(logged.record.longitude, -122.1);
    assert_eq!(logged.record.total_rooms, 2000.0);
    assert_eq!(logged.record.median_income, 4.5);
    assert_eq!(logged.record.ocean_proximity.as_str(), "NEAR BAY");
}

#[tokio::test]
async fn test_out_of_range_rejected_without_log_row() {
    let app = setup_test_app().await;
    let mut record = sample_record();
    record["longitude"] = json!(-130.0);

    let (status, body) = app.post_predict(body_of(&record)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["type"], "validation_error");
    assert_eq!(body["error"]["details"][0]["field"], "longitude");
    assert_eq!(body["error"]["details"][0]["constraint"], "out_of_range");

    assert_eq!(app.state.service.store().count_predictions().await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_field_rejected() {
    let app = setup_test_app().await;
    let mut record = sample_record();
    record.as_object_mut().unwrap().remove("median_income");

    let (status, body) = app.post_predict(body_of(&record)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["field"], "median_income");
    assert_eq!(body["error"]["details"][0]["constraint"], "missing");
    assert_eq!(app.state.service.store().count_predictions().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_category_rejected() {
    let app = setup_test_app().await;
    let mut record = sample_record();
    record["ocean_proximity"] = json!("DOWNTOWN");

    let (status, body) = app.post_predict(body_of(&record)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["constraint"], "not_in_enumeration");
}

#[tokio::test]
async fn test_malformed_json_is_validation_error() {
    let app = setup_test_app().await;

    let (status, body) = app.post_predict("{\"longitude\": ").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["details"][0]["field"], "body");
    assert_eq!(app.state.service.store().count_predictions().await.unwrap(), 0);
}

#[tokio::test]
async fn test_store_failure_returns_500_and_fails_readiness() {
    let app = setup_test_app().await;
    app.state.health_registry.set_ready(true).await;

    rusqlite::Connection::open(&app.db_path)
        .unwrap()
        .execute_batch("DROP TABLE api_logs;")
        .unwrap();

    let (status, body) = app.post_predict(body_of(&sample_record())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["type"], "storage_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("api_logs"));

    let (status, body) = app.get_json("/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);
    assert_eq!(body["health"]["components"]["log_store"]["status"], "unhealthy");

    // reads hit the same missing table
    let (status, body) = app.get_json("/logs/db").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["type"], "storage_error");
}

#[tokio::test]
async fn test_db_logs_return_n_rows_newest_first() {
    let app = setup_test_app().await;
    let n = 5;
    for i in 0..n {
        let mut record = sample_record();
        record["median_income"] = json!(1.0 + i as f64);
        let (status, _) = app.post_predict(body_of(&record)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app.get_json(&format!("/logs/db?limit={}", n)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], n);

    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), n);
    let timestamps: Vec<&str> = logs.iter().map(|l| l["timestamp"].as_str().unwrap()).collect();
    assert!(timestamps.windows(2).all(|w| w[0] >= w[1]));

    // newest row is the highest income, which predicts the highest price
    let predictions: Vec<f64> = logs.iter().map(|l| l["prediction"].as_f64().unwrap()).collect();
    assert!(predictions.windows(2).all(|w| w[0] > w[1]));

    let (_, body) = app.get_json("/logs/db?limit=2").await;
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn test_db_logs_default_limit_and_rounding() {
    let app = setup_test_app().await;
    app.post_predict(body_of(&sample_record())).await;

    let (_, body) = app.get_json("/logs/db").await;
    assert_eq!(body["count"], 1);
    let latency = body["logs"][0]["latency_ms"].as_f64().unwrap();
    assert_eq!((latency * 100.0).round() / 100.0, latency);
}

#[tokio::test]
async fn test_json_and_html_logs_agree() {
    let app = setup_test_app().await;
    for _ in 0..3 {
        app.post_predict(body_of(&sample_record())).await;
    }

    let (_, json_body) = app.get_json("/logs/db?limit=10").await;
    let (status, html) = app.get("/logs/db/html?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(html).unwrap();
    assert!(html.contains("<h2>Recent Prediction Logs</h2>"));

    let html_timestamps: Vec<&str> = html
        .split("<tr><td>")
        .skip(1)
        .map(|row| row.split("</td>").next().unwrap())
        .collect();
    let json_timestamps: Vec<&str> = json_body["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["timestamp"].as_str().unwrap())
        .collect();
    assert_eq!(html_timestamps, json_timestamps);
}

#[tokio::test]
async fn test_text_logs() {
    let app = setup_test_app().await;

    let (status, body) = app.get("/logs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "No logs found.");

    let log_file = &app.state.log_file;
    std::fs::create_dir_all(log_file.parent().unwrap()).unwrap();
    let lines: String = (0..60).map(|i| format!("line {}\n", i)).collect();
    std::fs::write(log_file, lines).unwrap();

    let (_, body) = app.get("/logs").await;
    let text = String::from_utf8(body).unwrap();
    assert_eq!(text.lines().count(), 50);
    assert!(text.starts_with("line 10\n"));

    let (_, body) = app.get("/logs?lines=2").await;
    assert_eq!(String::from_utf8(body).unwrap(), "line 58\nline 59\n");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_test_app().await;
    app.post_predict(body_of(&sample_record())).await;
    app.get("/health").await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("housing_predictions_total"));
    assert!(text.contains("housing_prediction_latency_seconds_bucket"));
    assert!(text.contains(
        "housing_http_requests_total{method=\"GET\",route=\"/health\",status=\"200\"}"
    ));
}

#[tokio::test]
async fn test_home_page_and_static_assets() {
    let app = setup_test_app().await;

    let (status, body) = app.get("/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("predict-form"));

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/static/style.css").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap().to_str().unwrap(), "text/css");

    let (status, _) = app.get("/static/missing.js").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
