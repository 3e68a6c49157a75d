//! Persistent log store backed by SQLite
//!
//! Holds two append-only tables: `api_logs` (one row per served prediction)
//! and `train_runs` (one row per training invocation). Ids and timestamps
//! are assigned by the database. No update or delete is exposed.

use crate::models::{NewTrainingRun, PredictionLogEntry, TrainingRunEntry};
use crate::schema::{FeatureRecord, OceanProximity};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Default number of rows returned by log queries
pub const DEFAULT_LOG_LIMIT: u32 = 50;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS api_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        longitude REAL NOT NULL,
        latitude REAL NOT NULL,
        housing_median_age REAL NOT NULL,
        total_rooms REAL NOT NULL,
        total_bedrooms REAL NOT NULL,
        population REAL NOT NULL,
        households REAL NOT NULL,
        median_income REAL NOT NULL,
        ocean_proximity TEXT NOT NULL,
        prediction REAL NOT NULL,
        latency_ms REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_api_logs_ts ON api_logs(ts);
    CREATE TABLE IF NOT EXISTS train_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        model TEXT NOT NULL,
        r2 REAL NOT NULL,
        rmse REAL NOT NULL,
        mae REAL NOT NULL,
        params TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_train_runs_ts ON train_runs(ts);
";

const PREDICTION_COLUMNS: &str = "id, ts, longitude, latitude, housing_median_age, \
     total_rooms, total_bedrooms, population, households, median_income, ocean_proximity, \
     prediction, latency_ms";

/// Errors raised by the log store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Synchronous SQLite store
///
/// One connection guarded by a mutex; every insert is its own commit.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and create if needed) the database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        info!(path = %path.display(), "Opened log store");
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Append one prediction log row
    pub fn insert_prediction(
        &self,
        record: &FeatureRecord,
        prediction: f64,
        latency_ms: f64,
    ) -> Result<PredictionLogEntry> {
        let conn = self.lock()?;
        let (id, timestamp): (i64, String) = conn.query_row(
            "INSERT INTO api_logs (longitude, latitude, housing_median_age, total_rooms,
                                   total_bedrooms, population, households, median_income,
                                   ocean_proximity, prediction, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             RETURNING id, ts",
            params![
                record.longitude,
                record.latitude,
                record.housing_median_age,
                record.total_rooms,
                record.total_bedrooms,
                record.population,
                record.households,
                record.median_income,
                record.ocean_proximity.as_str(),
                prediction,
                latency_ms,
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        debug!(id, "Inserted prediction log row");

        Ok(PredictionLogEntry {
            id,
            timestamp,
            record: record.clone(),
            prediction,
            latency_ms,
        })
    }

    /// Most recent prediction rows, newest first
    pub fn recent_predictions(&self, limit: u32) -> Result<Vec<PredictionLogEntry>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM api_logs ORDER BY ts DESC, id DESC LIMIT ?1",
            PREDICTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([limit], prediction_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total number of logged predictions
    pub fn count_predictions(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM api_logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Append one training run row
    pub fn insert_training_run(&self, run: &NewTrainingRun) -> Result<TrainingRunEntry> {
        let conn = self.lock()?;
        let (id, timestamp): (i64, String) = conn.query_row(
            "INSERT INTO train_runs (model, r2, rmse, mae, params)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, ts",
            params![run.model, run.r2, run.rmse, run.mae, run.params],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(TrainingRunEntry {
            id,
            timestamp,
            model: run.model.clone(),
            r2: run.r2,
            rmse: run.rmse,
            mae: run.mae,
            params: run.params.clone(),
        })
    }

    /// Most recent training runs, newest first
    pub fn recent_training_runs(&self, limit: u32) -> Result<Vec<TrainingRunEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, ts, model, r2, rmse, mae, params
             FROM train_runs ORDER BY ts DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], |row| {
                Ok(TrainingRunEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    model: row.get(2)?,
                    r2: row.get(3)?,
                    rmse: row.get(4)?,
                    mae: row.get(5)?,
                    params: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Cheap round trip used by readiness checks
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

fn prediction_from_row(row: &Row<'_>) -> rusqlite::Result<PredictionLogEntry> {
    let proximity: String = row.get(10)?;
    let ocean_proximity = proximity
        .parse::<OceanProximity>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, e.into()))?;

    Ok(PredictionLogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        record: FeatureRecord {
            longitude: row.get(2)?,
            latitude: row.get(3)?,
            housing_median_age: row.get(4)?,
            total_rooms: row.get(5)?,
            total_bedrooms: row.get(6)?,
            population: row.get(7)?,
            households: row.get(8)?,
            median_income: row.get(9)?,
            ocean_proximity,
        },
        prediction: row.get(11)?,
        latency_ms: row.get(12)?,
    })
}

/// Async handle to the log store, shared by request handlers
///
/// Blocking SQLite calls run on the blocking thread pool.
#[derive(Clone)]
pub struct LogStore {
    inner: Arc<SqliteStore>,
}

impl LogStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_store(SqliteStore::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_store(SqliteStore::open_in_memory()?))
    }

    fn from_store(store: SqliteStore) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    pub async fn record_prediction(
        &self,
        record: FeatureRecord,
        prediction: f64,
        latency_ms: f64,
    ) -> Result<PredictionLogEntry> {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            store.insert_prediction(&record, prediction, latency_ms)
        })
        .await?
    }

    pub async fn recent_predictions(&self, limit: u32) -> Result<Vec<PredictionLogEntry>> {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || store.recent_predictions(limit)).await?
    }

    pub async fn count_predictions(&self) -> Result<u64> {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || store.count_predictions()).await?
    }

    pub async fn ping(&self) -> Result<()> {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || store.ping()).await?
    }
}
