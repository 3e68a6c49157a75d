//! housing-api - serves predictions from a trained housing price model
//!
//! Loads the model artifact once, opens the log store, and serves the HTTP
//! API until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use housing_api::{api, AppState, ServiceConfig};
use housing_lib::{
    health::{components, HealthRegistry},
    logging,
    observability::{ServiceMetrics, StructuredLogger},
    LogStore, ModelArtifact, PredictionService,
};
use std::sync::Arc;
use tracing::{info, warn};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServiceConfig::load()?;
    let log_file = logging::init(&config.log_dir, &config.log_level)?;

    info!(
        model_path = %config.model_path.display(),
        db_path = %config.db_path.display(),
        log_file = %log_file.display(),
        "Starting housing-api"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::MODEL).await;
    health_registry.register(components::LOG_STORE).await;

    let metrics = ServiceMetrics::new();
    let logger = StructuredLogger::new("housing-api");

    let artifact = ModelArtifact::load(&config.model_path)
        .with_context(|| format!("Failed to load model from {}", config.model_path.display()))?;
    metrics.set_model_info(artifact.model_name.as_str(), &artifact.model_version);
    let model_version = artifact.model_version.clone();

    let store = LogStore::open(&config.db_path)
        .with_context(|| format!("Failed to open log store {}", config.db_path.display()))?;
    store.ping().await.context("Log store is not reachable")?;

    let service = PredictionService::new(
        Arc::new(artifact),
        store,
        metrics.clone(),
        health_registry.clone(),
        logger.clone(),
    );
    let app_state = Arc::new(AppState::new(
        service,
        health_registry.clone(),
        metrics,
        log_file,
    ));

    let addr = config.bind_addr()?;
    logger.log_startup(SERVICE_VERSION, &model_version, &addr.to_string());
    health_registry.set_ready(true).await;

    api::serve(addr, app_state, shutdown_signal(logger)).await?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal(logger: StructuredLogger) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    };
    logger.log_shutdown(reason);
}
