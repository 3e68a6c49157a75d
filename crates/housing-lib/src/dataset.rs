//! CSV training data and the seeded train/test split

use crate::schema::{FeatureRow, NUM_NUMERIC};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Fraction of rows held out for evaluation
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

/// Seed shared by training and evaluation so both see the same split
pub const DEFAULT_SPLIT_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset has no usable rows")]
    Empty,

    #[error("invalid split: {0}")]
    InvalidSplit(String),
}

pub type Result<T> = std::result::Result<T, DatasetError>;

/// One CSV row; empty cells deserialize to `None`
#[derive(Debug, Clone, Deserialize)]
pub struct HousingRow {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub housing_median_age: Option<f64>,
    pub total_rooms: Option<f64>,
    pub total_bedrooms: Option<f64>,
    pub population: Option<f64>,
    pub households: Option<f64>,
    pub median_income: Option<f64>,
    pub ocean_proximity: Option<String>,
    pub median_house_value: Option<f64>,
}

impl HousingRow {
    fn feature_row(&self) -> FeatureRow {
        let cells: [Option<f64>; NUM_NUMERIC] = [
            self.longitude,
            self.latitude,
            self.housing_median_age,
            self.total_rooms,
            self.total_bedrooms,
            self.population,
            self.households,
            self.median_income,
        ];
        FeatureRow {
            numeric: cells.map(|c| c.unwrap_or(f64::NAN)),
            category: self
                .ocean_proximity
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

/// Feature rows with their targets, index-aligned
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub rows: Vec<FeatureRow>,
    pub targets: Vec<f64>,
}

impl Dataset {
    /// Load a CSV file with a header row
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::from_reader(file)?;
        info!(path = %path.display(), rows = dataset.len(), "Loaded dataset");
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

        let mut dataset = Dataset::default();
        let mut skipped = 0usize;
        for result in csv_reader.deserialize::<HousingRow>() {
            let row = result?;
            match row.median_house_value.filter(|v| v.is_finite()) {
                Some(target) => {
                    dataset.rows.push(row.feature_row());
                    dataset.targets.push(target);
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(skipped, "Skipped rows with a missing target");
        }
        if dataset.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
        }
    }

    /// Shuffle with a seeded stream and hold out `ceil(len * test_size)` rows
    ///
    /// Returns `(train, test)`. Both halves are non-empty.
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> Result<(Dataset, Dataset)> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(DatasetError::InvalidSplit(format!(
                "test_size must be in (0, 1), got {}",
                test_size
            )));
        }
        let n = self.len();
        let n_test = (n as f64 * test_size).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(DatasetError::InvalidSplit(format!(
                "{} rows cannot be split with test_size {}",
                n, test_size
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let (test_idx, train_idx) = indices.split_at(n_test);
        Ok((self.subset(train_idx), self.subset(test_idx)))
    }
}
