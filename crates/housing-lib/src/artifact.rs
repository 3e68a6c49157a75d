//! Versioned model artifact
//!
//! A fitted pipeline is persisted as one JSON file:
//!
//! ```json
//! { "format_version": 1, "checksum": "<sha256 hex>", "artifact": { ... } }
//! ```
//!
//! The checksum covers the exact bytes of the `artifact` value as written.
//! Loading verifies the format version, then the checksum, then that the
//! artifact was trained on the current feature schema.

use crate::estimator::{Estimator, EstimatorError, Hyperparameters, ModelKind};
use crate::evaluation::RegressionMetrics;
use crate::pipeline::{PipelineError, Preprocessor};
use crate::predictor::{InferenceError, Predictor};
use crate::schema::{self, FeatureRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Envelope version understood by this build
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Hex digits of the fingerprint kept in `model_version`
const VERSION_PREFIX_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact i/o failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported artifact format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("artifact checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("artifact features {found:?} do not match schema {expected:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("artifact is internally inconsistent: {0}")]
    Incompatible(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Estimator(#[from] EstimatorError),
}

pub type Result<T> = std::result::Result<T, ArtifactError>;

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    format_version: u32,
    checksum: &'a str,
    artifact: &'a RawValue,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    format_version: u32,
    checksum: String,
    artifact: Box<RawValue>,
}

/// Fitted preprocessing and estimator, plus provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_name: ModelKind,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub preprocessor: Preprocessor,
    pub estimator: Estimator,
    pub hyperparameters: Hyperparameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RegressionMetrics>,
}

impl ModelArtifact {
    /// Assemble an artifact from freshly fitted parts
    ///
    /// `model_version` is `<model>-<prefix of the fitted state's sha256>`, so
    /// two artifacts with identical fitted state share a version.
    pub fn new(
        preprocessor: Preprocessor,
        estimator: Estimator,
        hyperparameters: Hyperparameters,
        metrics: Option<RegressionMetrics>,
    ) -> Result<Self> {
        if preprocessor.n_output_features() != estimator.n_features() {
            return Err(ArtifactError::Incompatible(format!(
                "preprocessor emits {} columns, estimator expects {}",
                preprocessor.n_output_features(),
                estimator.n_features()
            )));
        }

        let fitted_state = serde_json::to_vec(&(&preprocessor, &estimator))?;
        let fingerprint = compute_checksum(&fitted_state);
        let model_name = estimator.kind();

        Ok(Self {
            model_name,
            model_version: format!("{}-{}", model_name, &fingerprint[..VERSION_PREFIX_LEN]),
            trained_at: Utc::now(),
            feature_names: schema::feature_names(),
            preprocessor,
            estimator,
            hyperparameters,
            metrics,
        })
    }

    /// Encode into the checksummed envelope
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = RawValue::from_string(serde_json::to_string(self)?)?;
        let checksum = compute_checksum(body.get().as_bytes());
        let envelope = EnvelopeOut {
            format_version: ARTIFACT_FORMAT_VERSION,
            checksum: &checksum,
            artifact: &body,
        };
        Ok(serde_json::to_vec_pretty(&envelope)?)
    }

    /// Decode and verify an envelope
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let envelope: EnvelopeIn = serde_json::from_slice(bytes)?;
        if envelope.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: envelope.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }

        let actual = compute_checksum(envelope.artifact.get().as_bytes());
        if actual != envelope.checksum {
            return Err(ArtifactError::ChecksumMismatch {
                expected: envelope.checksum,
                actual,
            });
        }

        let artifact: ModelArtifact = serde_json::from_str(envelope.artifact.get())?;
        artifact.check_compatible()?;
        Ok(artifact)
    }

    fn check_compatible(&self) -> Result<()> {
        let expected = schema::feature_names();
        if self.feature_names != expected {
            return Err(ArtifactError::FeatureMismatch {
                expected,
                found: self.feature_names.clone(),
            });
        }
        self.preprocessor
            .check_shape()
            .map_err(|e| ArtifactError::Incompatible(format!("preprocessor: {}", e)))?;
        self.estimator
            .check_structure()
            .map_err(|e| ArtifactError::Incompatible(format!("estimator: {}", e)))?;
        if self.preprocessor.n_output_features() != self.estimator.n_features() {
            return Err(ArtifactError::Incompatible(format!(
                "preprocessor emits {} columns, estimator expects {}",
                self.preprocessor.n_output_features(),
                self.estimator.n_features()
            )));
        }
        if self.estimator.kind() != self.model_name {
            return Err(ArtifactError::Incompatible(format!(
                "model_name {} but estimator is {}",
                self.model_name,
                self.estimator.kind()
            )));
        }
        Ok(())
    }

    /// Write atomically: temp file, fsync, rename
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let io_err = |source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let bytes = self.to_bytes()?;
        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(io_err)?;
        file.write_all(&bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&temp_path, path).map_err(io_err)?;

        info!(
            path = %path.display(),
            model_version = %self.model_version,
            size = bytes.len(),
            "Saved model artifact"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact = Self::from_slice(&bytes)?;
        debug!(
            path = %path.display(),
            model_version = %artifact.model_version,
            "Loaded model artifact"
        );
        Ok(artifact)
    }

    /// Preprocess and predict a batch of rows
    pub fn predict_rows(
        &self,
        rows: &[FeatureRow],
    ) -> std::result::Result<Vec<f64>, InferenceError> {
        let x = self.preprocessor.transform(rows)?;
        Ok(self.estimator.predict(&x)?)
    }
}

impl Predictor for ModelArtifact {
    fn predict(&self, rows: &[FeatureRow]) -> std::result::Result<Vec<f64>, InferenceError> {
        self.predict_rows(rows)
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}

/// Compute SHA256 checksum, hex encoded
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
