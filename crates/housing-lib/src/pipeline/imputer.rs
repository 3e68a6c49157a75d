//! Missing value imputation

use super::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replaces NaN cells with the per-column median seen during fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    pub medians: Vec<f64>,
}

impl MedianImputer {
    /// Fit on column-major data (one slice per column)
    pub fn fit(columns: &[Vec<f64>], names: &[&str]) -> Result<Self> {
        let medians = columns
            .iter()
            .zip(names)
            .map(|(column, name)| {
                median(column).ok_or_else(|| PipelineError::AllMissing(name.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { medians })
    }

    pub fn transform_value(&self, column: usize, value: f64) -> f64 {
        if value.is_nan() {
            self.medians[column]
        } else {
            value
        }
    }
}

/// Median of the non-NaN values, averaging the middle pair for even counts
pub(crate) fn median(values: &[f64]) -> Option<f64> {
    let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.is_empty() {
        return None;
    }
    present.sort_by(|a, b| a.total_cmp(b));
    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        Some((present[mid - 1] + present[mid]) / 2.0)
    } else {
        Some(present[mid])
    }
}

/// Replaces missing categories with the most frequent one seen during fit
///
/// Ties resolve to the lexicographically smallest category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostFrequentImputer {
    pub fill_value: String,
}

impl MostFrequentImputer {
    pub fn fit<'a, I>(values: I, name: &str) -> Result<Self>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for value in values.into_iter().flatten() {
            *counts.entry(value).or_insert(0) += 1;
        }

        let mut best: Option<(&str, usize)> = None;
        for (value, count) in counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((value, count));
            }
        }

        best.map(|(value, _)| Self {
            fill_value: value.to_string(),
        })
        .ok_or_else(|| PipelineError::AllMissing(name.to_string()))
    }

    pub fn transform_value<'a>(&'a self, value: Option<&'a str>) -> &'a str {
        value.unwrap_or(&self.fill_value)
    }
}
