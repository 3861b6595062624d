//! SMOTE oversampling

use crate::error::{ChurnError, Result};
use crate::synthetic::{class_counts, class_indices, ResampleResult, Sampler};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use tracing::debug;

/// Ordered float for BinaryHeap-based partial sort
#[derive(Debug, Clone, Copy)]
struct DistIdx(f64, usize);

impl PartialEq for DistIdx {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for DistIdx {}
impl PartialOrd for DistIdx {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistIdx {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0).then(self.1.cmp(&other.1))
    }
}

/// SMOTE (Synthetic Minority Over-sampling Technique)
///
/// Every class is oversampled up to the majority count. A synthetic row is
/// `p + gap * (n - p)` for a random class member `p`, one of its `k` nearest
/// same-class neighbors `n`, and `gap ~ U[0, 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SMOTE {
    /// Number of nearest neighbors
    k_neighbors: usize,
    /// Random seed
    seed: u64,
    /// Target samples per class
    target_counts: Option<BTreeMap<i64, usize>>,
}

impl SMOTE {
    /// Create new SMOTE sampler
    pub fn new() -> Self {
        Self {
            k_neighbors: 5,
            seed: 42,
            target_counts: None,
        }
    }

    /// Set number of neighbors
    pub fn with_k_neighbors(mut self, k: usize) -> Self {
        self.k_neighbors = k.max(1);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).powi(2)).sum()
    }

    /// k nearest members of `members` to `members[pos]`, excluding itself.
    /// Returns positions into `members`, nearest first.
    fn find_neighbors(x: &Array2<f64>, members: &[usize], pos: usize, k: usize) -> Vec<usize> {
        let point = x.row(members[pos]);
        let mut heap: BinaryHeap<DistIdx> = BinaryHeap::with_capacity(k + 1);

        for (j, &row) in members.iter().enumerate() {
            if j == pos {
                continue;
            }
            let item = DistIdx(Self::squared_distance(point, x.row(row)), j);
            if heap.len() < k {
                heap.push(item);
            } else if let Some(top) = heap.peek() {
                if item < *top {
                    heap.pop();
                    heap.push(item);
                }
            }
        }

        heap.into_sorted_vec().into_iter().map(|DistIdx(_, j)| j).collect()
    }
}

impl Default for SMOTE {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SMOTE {
    fn fit(&mut self, _x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        let counts = class_counts(y);

        if counts.len() < 2 {
            return Err(ChurnError::InsufficientData(
                "SMOTE needs at least 2 classes".to_string(),
            ));
        }

        let max_count = counts.values().copied().max().unwrap_or(0);
        let targets = counts.keys().map(|&class| (class, max_count)).collect();

        self.target_counts = Some(targets);
        Ok(())
    }

    fn resample(&self, x: &Array2<f64>, y: &Array1<i64>) -> Result<ResampleResult> {
        let targets = self.target_counts.as_ref().ok_or(ChurnError::ModelNotFitted)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let indices = class_indices(y);
        let n_features = x.ncols();

        let mut synthetic_x: Vec<f64> = Vec::new();
        let mut synthetic_y: Vec<i64> = Vec::new();
        let mut n_synthetic = BTreeMap::new();

        for (&class, &target_count) in targets {
            let members = indices.get(&class).map(Vec::as_slice).unwrap_or(&[]);
            let n_to_generate = target_count.saturating_sub(members.len());
            n_synthetic.insert(class, n_to_generate);

            if n_to_generate == 0 {
                continue;
            }
            if members.len() < 2 {
                return Err(ChurnError::InsufficientData(format!(
                    "class {} has {} sample(s); SMOTE needs at least 2 to interpolate",
                    class,
                    members.len()
                )));
            }

            let k = self.k_neighbors.min(members.len() - 1);
            let neighbors: Vec<Vec<usize>> = (0..members.len())
                .into_par_iter()
                .map(|pos| Self::find_neighbors(x, members, pos, k))
                .collect();

            debug!(class, existing = members.len(), n_to_generate, k, "SMOTE oversampling");

            for _ in 0..n_to_generate {
                let pos = rng.gen_range(0..members.len());
                let nn = &neighbors[pos];
                let neighbor = members[nn[rng.gen_range(0..nn.len())]];
                let gap: f64 = rng.gen();

                let p = x.row(members[pos]);
                let n = x.row(neighbor);
                synthetic_x.extend(p.iter().zip(n.iter()).map(|(&pi, &ni)| pi + gap * (ni - pi)));
                synthetic_y.push(class);
            }
        }

        // Original rows first, synthetic rows appended
        let n_original = x.nrows();
        let n_total = n_original + synthetic_y.len();
        let result_x = Array2::from_shape_fn((n_total, n_features), |(i, j)| {
            if i < n_original {
                x[[i, j]]
            } else {
                synthetic_x[(i - n_original) * n_features + j]
            }
        });

        let mut all_y: Vec<i64> = y.to_vec();
        all_y.extend_from_slice(&synthetic_y);

        Ok(ResampleResult {
            x: result_x,
            y: Array1::from_vec(all_y),
            n_synthetic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_imbalanced_data() -> (Array2<f64>, Array1<i64>) {
        let mut x_data = Vec::new();
        let mut y_data = Vec::new();

        for i in 0..20 {
            x_data.extend_from_slice(&[i as f64, (i * 2) as f64]);
            y_data.push(0);
        }
        for i in 0..5 {
            x_data.extend_from_slice(&[100.0 + i as f64, 200.0 + i as f64]);
            y_data.push(1);
        }

        (
            Array2::from_shape_vec((25, 2), x_data).unwrap(),
            Array1::from_vec(y_data),
        )
    }

    #[test]
    fn test_smote_equalizes_classes() {
        let (x, y) = create_imbalanced_data();
        let mut smote = SMOTE::new().with_k_neighbors(3).with_seed(42);
        let result = smote.fit_resample(&x, &y).unwrap();

        let counts = class_counts(&result.y);
        assert_eq!(counts[&0], 20);
        assert_eq!(counts[&1], 20);
        assert_eq!(result.n_synthetic[&0], 0);
        assert_eq!(result.n_synthetic[&1], 15);
        assert_eq!(result.total_synthetic(), 15);
    }

    #[test]
    fn test_smote_keeps_originals_and_interpolates() {
        let (x, y) = create_imbalanced_data();
        let result = SMOTE::new().with_seed(7).fit_resample(&x, &y).unwrap();

        assert_eq!(result.x.slice(ndarray::s![..25, ..]), x);
        for row in result.x.slice(ndarray::s![25.., ..]).rows() {
            assert!(row[0] >= 100.0 && row[0] <= 104.0);
            assert!(row[1] >= 200.0 && row[1] <= 204.0);
        }
    }

    #[test]
    fn test_smote_deterministic_with_seed() {
        let (x, y) = create_imbalanced_data();
        let a = SMOTE::new().with_seed(11).fit_resample(&x, &y).unwrap();
        let b = SMOTE::new().with_seed(11).fit_resample(&x, &y).unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.y, b.y);
    }

    #[test]
    fn test_smote_duplicate_minority_points() {
        // Identical minority rows still have neighbors; synthetic rows equal them
        let x = Array2::from_shape_vec((5, 1), vec![0.0, 1.0, 2.0, 9.0, 9.0]).unwrap();
        let y = Array1::from_vec(vec![0, 0, 0, 1, 1]);
        let result = SMOTE::new().fit_resample(&x, &y).unwrap();
        assert_eq!(result.y.len(), 6);
        assert_eq!(result.x[[5, 0]], 9.0);
    }

    #[test]
    fn test_smote_single_minority_sample_fails() {
        let x = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 2.0, 9.0]).unwrap();
        let y = Array1::from_vec(vec![0, 0, 0, 1]);
        let err = SMOTE::new().fit_resample(&x, &y).unwrap_err();
        assert!(matches!(err, ChurnError::InsufficientData(_)));
    }

    #[test]
    fn test_smote_single_class_fails() {
        let x = Array2::zeros((3, 2));
        let y = Array1::from_vec(vec![1, 1, 1]);
        assert!(SMOTE::new().fit_resample(&x, &y).is_err());
    }
}
