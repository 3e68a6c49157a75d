//! Commands that talk to a running prediction server

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, LogRow};
use crate::output::{format_price, print_info, print_json, print_table, OutputFormat};

/// Row for the prediction log table
#[derive(Tabled, serde::Serialize)]
struct PredictionRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Prediction")]
    prediction: String,
    #[tabled(rename = "Latency (ms)")]
    latency_ms: String,
}

impl From<&LogRow> for PredictionRow {
    fn from(row: &LogRow) -> Self {
        Self {
            timestamp: row.timestamp.clone(),
            prediction: format_price(row.prediction),
            latency_ms: format!("{:.2}", row.latency_ms),
        }
    }
}

/// POST the record in `file` to `/predict`
pub async fn predict(client: &ApiClient, file: &Path, format: OutputFormat) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let record: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let result = client.predict(&record).await?;

    match format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Table => {
            println!(
                "{} {}",
                "Predicted value:".bold(),
                format_price(result.prediction).green().bold()
            );
            println!("Latency:         {:.2} ms", result.latency_ms);
        }
    }

    Ok(())
}

/// Recent prediction log rows from `/logs/db`
pub async fn show_logs(client: &ApiClient, limit: u32, format: OutputFormat) -> Result<()> {
    let result = client.recent_logs(limit).await?;

    match format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Table => {
            let rows: Vec<PredictionRow> = result.logs.iter().map(PredictionRow::from).collect();
            print_table(&rows, format);
            print_info(&format!("{} rows", result.count));
        }
    }

    Ok(())
}
