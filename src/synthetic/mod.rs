//! Class balancing module
//!
//! Provides minority oversampling for the labeled feature table:
//! - [`SMOTE`] (Synthetic Minority Over-sampling Technique)
//! - [`ClassBalancer`] applying SMOTE to a [`LabeledTable`](crate::feature_engineering::LabeledTable)
//!   with the single-class and already-balanced no-op branches

mod balancer;
mod smote;

pub use balancer::ClassBalancer;
pub use smote::SMOTE;

use crate::error::Result;
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// Result of resampling
#[derive(Debug, Clone)]
pub struct ResampleResult {
    /// Resampled features, original rows first
    pub x: Array2<f64>,
    /// Resampled labels
    pub y: Array1<i64>,
    /// Synthetic rows generated per class
    pub n_synthetic: BTreeMap<i64, usize>,
}

impl ResampleResult {
    pub fn total_synthetic(&self) -> usize {
        self.n_synthetic.values().sum()
    }
}

/// Trait for samplers
pub trait Sampler: Send + Sync {
    /// Fit the sampler on data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()>;

    /// Resample data
    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult>;

    /// Fit and resample in one step
    fn fit_resample(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        self.fit(x, y)?;
        self.resample(x, y)
    }
}

/// Get class distribution, ordered by label
pub fn class_counts(y: &Array1<i64>) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    for &label in y.iter() {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Get row indices for each class, ordered by label
pub fn class_indices(y: &Array1<i64>) -> BTreeMap<i64, Vec<usize>> {
    let mut indices = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices.entry(label).or_insert_with(Vec::new).push(i);
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_counts_and_indices() {
        let y = Array1::from_vec(vec![1, 0, 1, 1, 0]);
        let counts = class_counts(&y);
        assert_eq!(counts.into_iter().collect::<Vec<_>>(), vec![(0, 2), (1, 3)]);
        let idx = class_indices(&y);
        assert_eq!(idx[&0], vec![1, 4]);
        assert_eq!(idx[&1], vec![0, 2, 3]);
    }
}
