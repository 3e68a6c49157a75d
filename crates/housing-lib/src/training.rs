//! Training and evaluation runs
//!
//! Both entry points are synchronous; forest fitting parallelizes on the
//! rayon pool.

use crate::artifact::{ArtifactError, ModelArtifact};
use crate::dataset::{Dataset, DatasetError, DEFAULT_SPLIT_SEED, DEFAULT_TEST_SIZE};
use crate::estimator::{Estimator, EstimatorError, Hyperparameters, ModelKind};
use crate::evaluation::RegressionMetrics;
use crate::models::{NewTrainingRun, TrainingRunEntry};
use crate::observability::StructuredLogger;
use crate::pipeline::{PipelineError, Preprocessor};
use crate::predictor::InferenceError;
use crate::store::{SqliteStore, StoreError};
use ndarray::Array1;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::info;

/// File name of the artifact inside the models directory
pub const ARTIFACT_FILE_NAME: &str = "model.json";

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Estimator(#[from] EstimatorError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode hyperparameters: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cannot score an empty test split")]
    EmptyTestSplit,
}

pub type Result<T> = std::result::Result<T, TrainingError>;

/// Inputs of one training run
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub data_path: PathBuf,
    pub models_dir: PathBuf,
    /// Database receiving the training-run row
    pub db_path: PathBuf,
    pub hyperparameters: Hyperparameters,
    pub test_size: f64,
    pub split_seed: u64,
}

impl TrainConfig {
    /// Default hyperparameters and split for `model`
    pub fn new(
        model: ModelKind,
        data_path: impl Into<PathBuf>,
        models_dir: impl Into<PathBuf>,
        db_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_path: data_path.into(),
            models_dir: models_dir.into(),
            db_path: db_path.into(),
            hyperparameters: Hyperparameters::defaults_for(model),
            test_size: DEFAULT_TEST_SIZE,
            split_seed: DEFAULT_SPLIT_SEED,
        }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.models_dir.join(ARTIFACT_FILE_NAME)
    }
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact_path: PathBuf,
    pub model_version: String,
    pub metrics: RegressionMetrics,
    pub run: TrainingRunEntry,
    pub n_train: usize,
}

/// Result of evaluating a saved artifact
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub model_version: String,
    pub metrics: RegressionMetrics,
}

/// Fit, score, persist and record one model
pub fn train(config: &TrainConfig) -> Result<TrainingOutcome> {
    let logger = StructuredLogger::new("housing-train");
    let model = config.hyperparameters.kind();
    let started = Instant::now();

    let dataset = Dataset::load(&config.data_path)?;
    let (train_set, test_set) = dataset.train_test_split(config.test_size, config.split_seed)?;

    let preprocessor = Preprocessor::fit(&train_set.rows)?;
    let x_train = preprocessor.transform(&train_set.rows)?;
    let y_train = Array1::from_vec(train_set.targets.clone());
    let estimator = Estimator::fit(&config.hyperparameters, &x_train, &y_train)?;
    info!(
        model = %model,
        n_train = train_set.len(),
        n_features = preprocessor.n_output_features(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Fitted estimator"
    );

    let artifact =
        ModelArtifact::new(preprocessor, estimator, config.hyperparameters.clone(), None)?;
    let metrics = score(&artifact, &test_set)?;
    let artifact = ModelArtifact {
        metrics: Some(metrics),
        ..artifact
    };

    let artifact_path = config.artifact_path();
    artifact.save(&artifact_path)?;

    let store = SqliteStore::open(&config.db_path)?;
    let run = store.insert_training_run(&NewTrainingRun {
        model: model.to_string(),
        r2: metrics.r2,
        rmse: metrics.rmse,
        mae: metrics.mae,
        params: serde_json::to_string(&config.hyperparameters)?,
    })?;

    logger.log_training_run(model.as_str(), &metrics, &artifact_path);

    Ok(TrainingOutcome {
        artifact_path,
        model_version: artifact.model_version,
        metrics,
        run,
        n_train: train_set.len(),
    })
}

/// Recompute held-out metrics for a saved artifact
///
/// Uses the same seeded split as training, so the test rows match.
pub fn evaluate(
    model_path: impl AsRef<Path>,
    data_path: impl AsRef<Path>,
    test_size: f64,
    split_seed: u64,
) -> Result<EvaluationReport> {
    let artifact = ModelArtifact::load(model_path)?;
    let dataset = Dataset::load(data_path)?;
    let (_, test_set) = dataset.train_test_split(test_size, split_seed)?;

    let metrics = score(&artifact, &test_set)?;
    StructuredLogger::new("housing-evaluate").log_evaluation(&artifact.model_version, &metrics);

    Ok(EvaluationReport {
        model_version: artifact.model_version,
        metrics,
    })
}

fn score(artifact: &ModelArtifact, test_set: &Dataset) -> Result<RegressionMetrics> {
    let predictions = artifact.predict_rows(&test_set.rows)?;
    RegressionMetrics::compute(&test_set.targets, &predictions).ok_or(TrainingError::EmptyTestSplit)
}
