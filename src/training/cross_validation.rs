//! Stratified cross-validation and train/test splitting

use crate::error::{ChurnError, Result};
use crate::feature_engineering::LabeledTable;
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Both churn labels; a stratified split expects each of them
const LABELS: [i64; 2] = [0, 1];

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Shuffled class-index lists, ordered by label
fn shuffled_class_indices(y: &Array1<i64>, rng: &mut ChaCha8Rng) -> BTreeMap<i64, Vec<usize>> {
    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in y.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }
    for indices in by_class.values_mut() {
        indices.shuffle(rng);
    }
    by_class
}

/// Stratified K-Fold: every fold keeps the class ratio of the full set.
///
/// Each class is shuffled once with the seed, then dealt round-robin across
/// folds. The deal continues where the previous class stopped so fold sizes
/// differ by at most one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratifiedKFold {
    n_splits: usize,
    seed: u64,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits, seed: 42 }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generate train/test splits
    ///
    /// Fails with [`ChurnError::InsufficientData`] when either label has fewer
    /// rows than folds; the fold count is never lowered to fit.
    pub fn split(&self, y: &Array1<i64>) -> Result<Vec<CVSplit>> {
        if self.n_splits < 2 {
            return Err(ChurnError::InvalidParameter {
                name: "n_splits".to_string(),
                value: self.n_splits.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let by_class = shuffled_class_indices(y, &mut rng);

        for label in LABELS {
            let count = by_class.get(&label).map_or(0, Vec::len);
            if count < self.n_splits {
                return Err(ChurnError::InsufficientData(format!(
                    "class {} has {} example(s), fewer than {} folds",
                    label, count, self.n_splits
                )));
            }
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        let mut offset = 0;
        for indices in by_class.values() {
            for (i, &idx) in indices.iter().enumerate() {
                folds[(offset + i) % self.n_splits].push(idx);
            }
            offset += indices.len();
        }

        let splits = (0..self.n_splits)
            .map(|fold_idx| {
                let mut test_indices = folds[fold_idx].clone();
                test_indices.sort_unstable();
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();
                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect();

        Ok(splits)
    }
}

/// Stratified train/test partitioning of a [`LabeledTable`].
///
/// Each class contributes `round(count * test_fraction)` rows to the test
/// side. Both partitions keep the input row order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratifiedSplitter {
    test_fraction: f64,
    seed: u64,
}

impl Default for StratifiedSplitter {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl StratifiedSplitter {
    pub fn new(test_fraction: f64) -> Self {
        Self {
            test_fraction,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Row indices of the (train, test) partitions
    pub fn split_indices(&self, y: &Array1<i64>) -> Result<(Vec<usize>, Vec<usize>)> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ChurnError::InvalidParameter {
                name: "test_fraction".to_string(),
                value: self.test_fraction.to_string(),
                reason: "must lie strictly between 0 and 1".to_string(),
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let by_class = shuffled_class_indices(y, &mut rng);

        let mut train = Vec::with_capacity(y.len());
        let mut test = Vec::new();
        for indices in by_class.values() {
            let n_test = ((indices.len() as f64 * self.test_fraction).round() as usize)
                .min(indices.len());
            test.extend_from_slice(&indices[..n_test]);
            train.extend_from_slice(&indices[n_test..]);
        }

        if train.is_empty() || test.is_empty() {
            return Err(ChurnError::InsufficientData(format!(
                "{} row(s) cannot fill both partitions at test fraction {}",
                y.len(),
                self.test_fraction
            )));
        }

        train.sort_unstable();
        test.sort_unstable();
        Ok((train, test))
    }

    /// Split a table into (train, test)
    pub fn split(&self, table: &LabeledTable) -> Result<(LabeledTable, LabeledTable)> {
        let (train, test) = self.split_indices(table.y())?;
        Ok((table.select(&train), table.select(&test)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n0: usize, n1: usize) -> Array1<i64> {
        Array1::from_shape_fn(n0 + n1, |i| if i < n0 { 0 } else { 1 })
    }

    #[test]
    fn test_stratified_kfold_preserves_ratio() {
        let y = labels(40, 10);
        let splits = StratifiedKFold::new(5).with_random_state(42).split(&y).unwrap();
        assert_eq!(splits.len(), 5);

        let mut seen = vec![0; y.len()];
        for split in &splits {
            let ones = split.test_indices.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(split.test_indices.len(), 10);
            assert_eq!(ones, 2);
            assert_eq!(split.train_indices.len() + split.test_indices.len(), 50);
            for &i in &split.test_indices {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_stratified_kfold_uneven_sizes() {
        let y = labels(13, 9);
        let splits = StratifiedKFold::new(5).split(&y).unwrap();
        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        let max = *sizes.iter().max().unwrap();
        let min = *sizes.iter().min().unwrap();
        assert!(max - min <= 1);
        assert_eq!(sizes.iter().sum::<usize>(), 22);
    }

    #[test]
    fn test_stratified_kfold_insufficient_minority() {
        let y = labels(20, 3);
        let err = StratifiedKFold::new(5).split(&y).unwrap_err();
        assert!(matches!(err, ChurnError::InsufficientData(_)));

        let y = labels(20, 0);
        assert!(matches!(
            StratifiedKFold::new(5).split(&y),
            Err(ChurnError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_stratified_kfold_rejects_one_fold() {
        let y = labels(10, 10);
        assert!(matches!(
            StratifiedKFold::new(1).split(&y),
            Err(ChurnError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_stratified_kfold_deterministic() {
        let y = labels(30, 12);
        let a = StratifiedKFold::new(4).with_random_state(9).split(&y).unwrap();
        let b = StratifiedKFold::new(4).with_random_state(9).split(&y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_splitter_ratio_and_determinism() {
        let y = labels(90, 10);
        let splitter = StratifiedSplitter::new(0.2).with_seed(42);
        let (train, test) = splitter.split_indices(&y).unwrap();
        assert_eq!(test.len(), 20);
        assert_eq!(train.len(), 80);
        assert_eq!(test.iter().filter(|&&i| y[i] == 1).count(), 2);

        let again = splitter.split_indices(&y).unwrap();
        assert_eq!((train, test), again);
    }

    #[test]
    fn test_splitter_partitions_are_disjoint_and_sorted() {
        let y = labels(17, 8);
        let (train, test) = StratifiedSplitter::new(0.3).split_indices(&y).unwrap();
        assert!(train.windows(2).all(|w| w[0] < w[1]));
        assert!(test.windows(2).all(|w| w[0] < w[1]));
        assert!(train.iter().all(|i| !test.contains(i)));
        assert_eq!(train.len() + test.len(), 25);
    }

    #[test]
    fn test_splitter_bad_fraction() {
        let y = labels(5, 5);
        assert!(StratifiedSplitter::new(0.0).split_indices(&y).is_err());
        assert!(StratifiedSplitter::new(1.0).split_indices(&y).is_err());
    }

    #[test]
    fn test_splitter_too_small() {
        let y = labels(1, 1);
        let err = StratifiedSplitter::new(0.2).split_indices(&y).unwrap_err();
        assert!(matches!(err, ChurnError::InsufficientData(_)));
    }
}
