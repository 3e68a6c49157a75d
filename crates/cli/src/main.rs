//! Housing price service CLI
//!
//! Trains and evaluates models locally and queries a running prediction
//! server.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{model, serving};
use housing_lib::{logging, ModelKind, DEFAULT_LOG_LIMIT};
use std::path::PathBuf;

/// Housing price service CLI
#[derive(Parser)]
#[command(name = "housing")]
#[command(author, version, long_about = None)]
#[command(about = "CLI for the Housing Price Prediction service")]
pub struct Cli {
    /// API endpoint URL (can also be set via HOUSING_API_URL env var)
    #[arg(long, env = "HOUSING_API_URL", default_value = "http://localhost:8000")]
    pub api_url: String,

    /// Directory for the text log of local commands
    #[arg(long, env = "HOUSING_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model and save its artifact
    Train {
        /// Estimator to fit (linreg, rf)
        #[arg(long, short, default_value = "linreg")]
        model: ModelKind,

        /// Training CSV
        #[arg(long, short)]
        data: PathBuf,

        /// Directory receiving model.json
        #[arg(long, default_value = "models")]
        models_dir: PathBuf,

        /// SQLite database for the training-run log
        #[arg(long, env = "HOUSING_DB_PATH", default_value = "db/app.db")]
        db: PathBuf,
    },

    /// Recompute held-out metrics for a saved model
    Evaluate {
        /// Model artifact to evaluate
        #[arg(long, default_value = "models/model.json")]
        model_path: PathBuf,

        /// CSV the model was trained on
        #[arg(long, short)]
        data: PathBuf,
    },

    /// Show recent training runs
    Runs {
        /// Number of runs to show
        #[arg(long, short, default_value_t = DEFAULT_LOG_LIMIT)]
        limit: u32,

        /// SQLite database holding the training-run log
        #[arg(long, env = "HOUSING_DB_PATH", default_value = "db/app.db")]
        db: PathBuf,
    },

    /// Send one record to the prediction server
    Predict {
        /// JSON file with the record
        #[arg(long)]
        file: PathBuf,
    },

    /// Show recent predictions logged by the server
    Logs {
        /// Number of rows to show
        #[arg(long, short, default_value_t = DEFAULT_LOG_LIMIT)]
        limit: u32,
    },
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Train {
            model,
            data,
            models_dir,
            db,
        } => {
            logging::init_file_only(&cli.log_dir, "info")?;
            model::train(model, data, models_dir, db, cli.format).await?;
        }
        Commands::Evaluate { model_path, data } => {
            logging::init_file_only(&cli.log_dir, "info")?;
            model::evaluate(model_path, data, cli.format).await?;
        }
        Commands::Runs { limit, db } => {
            model::list_runs(db, limit, cli.format).await?;
        }
        Commands::Predict { file } => {
            let client = client::ApiClient::new(&cli.api_url)?;
            serving::predict(&client, &file, cli.format).await?;
        }
        Commands::Logs { limit } => {
            let client = client::ApiClient::new(&cli.api_url)?;
            serving::show_logs(&client, limit, cli.format).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
