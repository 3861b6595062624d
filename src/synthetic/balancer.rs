//! Class balancing for labeled feature tables

use crate::error::Result;
use crate::feature_engineering::LabeledTable;
use crate::synthetic::{Sampler, SMOTE};
use tracing::{debug, info};

/// Equalizes churn / non-churn counts with SMOTE.
///
/// A single-label table is returned unchanged, as is one whose classes are
/// already the same size.
#[derive(Debug, Clone)]
pub struct ClassBalancer {
    k_neighbors: usize,
    seed: u64,
}

impl Default for ClassBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassBalancer {
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            seed: 42,
        }
    }

    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Balance a table, returning the balanced table and the number of synthetic rows
    pub fn balance(&self, table: &LabeledTable) -> Result<(LabeledTable, usize)> {
        let counts = table.class_counts();

        if counts.len() < 2 {
            debug!(?counts, "Single class present, skipping balancing");
            return Ok((table.clone(), 0));
        }

        let min = counts.values().min();
        if min == counts.values().max() {
            debug!(?counts, "Classes already balanced");
            return Ok((table.clone(), 0));
        }

        let mut smote = SMOTE::new()
            .with_k_neighbors(self.k_neighbors)
            .with_seed(self.seed);
        let result = smote.fit_resample(table.x(), table.y())?;
        let n_synthetic = result.total_synthetic();
        let balanced = LabeledTable::new(result.x, result.y)?;

        info!(
            before = ?counts,
            after = ?balanced.class_counts(),
            n_synthetic,
            "Balanced classes"
        );

        Ok((balanced, n_synthetic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_engineering::N_FEATURES;
    use ndarray::{Array1, Array2};

    fn table(n0: usize, n1: usize) -> LabeledTable {
        let n = n0 + n1;
        let x = Array2::from_shape_fn((n, N_FEATURES), |(i, j)| {
            let base = if i < n0 { 0.0 } else { 50.0 };
            base + (i * (j + 1)) as f64 % 7.0
        });
        let y = Array1::from_shape_fn(n, |i| if i < n0 { 0 } else { 1 });
        LabeledTable::new(x, y).unwrap()
    }

    #[test]
    fn test_balance_90_10() {
        let (balanced, n_synthetic) = ClassBalancer::new().balance(&table(90, 10)).unwrap();
        let counts = balanced.class_counts();
        assert_eq!(counts[&0], 90);
        assert_eq!(counts[&1], 90);
        assert_eq!(n_synthetic, 80);
        // Majority rows are untouched and keep their position
        let original = table(90, 10);
        assert_eq!(balanced.select(&(0..100).collect::<Vec<_>>()), original);
    }

    #[test]
    fn test_single_class_is_noop() {
        let t = table(0, 12);
        let (out, n) = ClassBalancer::new().balance(&t).unwrap();
        assert_eq!(out, t);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_equal_classes_is_noop() {
        let t = table(6, 6);
        let (out, n) = ClassBalancer::new().balance(&t).unwrap();
        assert_eq!(out, t);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_empty_table_is_noop() {
        let t = table(0, 0);
        let (out, _) = ClassBalancer::new().balance(&t).unwrap();
        assert!(out.is_empty());
    }
}
