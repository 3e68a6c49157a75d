//! Service configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Optional config file read from the working directory
pub const CONFIG_FILE: &str = "housing";

/// Service configuration
///
/// Layered as defaults, then `housing.toml` if present, then `HOUSING_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Model artifact loaded at startup
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// SQLite database for prediction logs
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory holding `app.log`
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/model.json")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("db/app.db")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            model_path: default_model_path(),
            db_path: default_db_path(),
            log_dir: default_log_dir(),
            log_level: default_log_level(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        Self::from_builder(
            config::Config::builder()
                .add_source(config::File::with_name(CONFIG_FILE).required(false))
                .add_source(config::Environment::with_prefix("HOUSING")),
        )
    }

    fn from_builder(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}
