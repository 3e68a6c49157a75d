//! Local training, evaluation and run-history commands

use anyhow::{Context, Result};
use colored::Colorize;
use housing_lib::{
    dataset::{DEFAULT_SPLIT_SEED, DEFAULT_TEST_SIZE},
    training, ModelKind, RegressionMetrics, SqliteStore, TrainConfig, TrainingRunEntry,
};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::output::{color_r2, print_json, print_success, print_table, OutputFormat};

#[derive(Serialize)]
struct TrainSummary {
    model: String,
    model_version: String,
    artifact_path: PathBuf,
    n_train: usize,
    metrics: RegressionMetrics,
    run_id: i64,
}

#[derive(Serialize)]
struct EvaluationSummary {
    model_version: String,
    metrics: RegressionMetrics,
}

/// Row for the training-run history table
#[derive(Tabled, Serialize)]
struct RunRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "R²")]
    r2: String,
    #[tabled(rename = "RMSE")]
    rmse: String,
    #[tabled(rename = "MAE")]
    mae: String,
    #[tabled(rename = "Params")]
    params: String,
}

impl From<&TrainingRunEntry> for RunRow {
    fn from(run: &TrainingRunEntry) -> Self {
        Self {
            id: run.id,
            timestamp: run.timestamp.clone(),
            model: run.model.clone(),
            r2: format!("{:.4}", run.r2),
            rmse: format!("{:.2}", run.rmse),
            mae: format!("{:.2}", run.mae),
            params: run.params.clone(),
        }
    }
}

fn print_metrics(metrics: &RegressionMetrics) {
    println!("R²:          {}", color_r2(metrics.r2));
    println!("RMSE:        {:.2}", metrics.rmse);
    println!("MAE:         {:.2}", metrics.mae);
    println!("Test rows:   {}", metrics.n_samples);
}

/// Fit a model, save its artifact and record the run
pub async fn train(
    model: ModelKind,
    data: PathBuf,
    models_dir: PathBuf,
    db: PathBuf,
    format: OutputFormat,
) -> Result<()> {
    let config = TrainConfig::new(model, data, models_dir, db);
    let outcome = tokio::task::spawn_blocking(move || training::train(&config))
        .await
        .context("Training task panicked")?
        .context("Training failed")?;

    match format {
        OutputFormat::Json => print_json(&TrainSummary {
            model: model.to_string(),
            model_version: outcome.model_version,
            artifact_path: outcome.artifact_path,
            n_train: outcome.n_train,
            metrics: outcome.metrics,
            run_id: outcome.run.id,
        }),
        OutputFormat::Table => {
            print_success(&format!(
                "Trained {} on {} rows",
                model.to_string().cyan(),
                outcome.n_train
            ));
            println!("Version:     {}", outcome.model_version.bold());
            println!("Artifact:    {}", outcome.artifact_path.display());
            print_metrics(&outcome.metrics);
        }
    }

    Ok(())
}

/// Score a saved artifact on the held-out split of `data`
pub async fn evaluate(model_path: PathBuf, data: PathBuf, format: OutputFormat) -> Result<()> {
    let report = tokio::task::spawn_blocking(move || {
        training::evaluate(&model_path, &data, DEFAULT_TEST_SIZE, DEFAULT_SPLIT_SEED)
    })
    .await
    .context("Evaluation task panicked")?
    .context("Evaluation failed")?;

    match format {
        OutputFormat::Json => print_json(&EvaluationSummary {
            model_version: report.model_version,
            metrics: report.metrics,
        }),
        OutputFormat::Table => {
            println!("{}", "Evaluation".bold());
            println!("{}", "=".repeat(40));
            println!("Version:     {}", report.model_version.bold());
            print_metrics(&report.metrics);
        }
    }

    Ok(())
}

/// Most recent training runs, newest first
pub async fn list_runs(db: PathBuf, limit: u32, format: OutputFormat) -> Result<()> {
    let runs = tokio::task::spawn_blocking(move || {
        let store = SqliteStore::open(&db)?;
        store.recent_training_runs(limit)
    })
    .await
    .context("Store task panicked")?
    .context("Failed to read training runs")?;

    let rows: Vec<RunRow> = runs.iter().map(RunRow::from).collect();
    print_table(&rows, format);
    Ok(())
}
