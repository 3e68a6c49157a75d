//! One-hot encoding for the categorical column

use serde::{Deserialize, Serialize};

/// One-hot encoder over the sorted categories seen during fit
///
/// Categories not seen during fit encode as all zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub categories: Vec<String>,
}

impl OneHotEncoder {
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut categories: Vec<String> = values.into_iter().map(str::to_string).collect();
        categories.sort();
        categories.dedup();
        Self { categories }
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    /// Index of the hot column, if the category is known
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.categories.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }

    /// Write the encoding into `out`, which must be `width()` long
    pub fn encode_into(&self, value: &str, out: &mut [f64]) {
        out.iter_mut().for_each(|v| *v = 0.0);
        if let Some(idx) = self.index_of(value) {
            out[idx] = 1.0;
        }
    }
}
