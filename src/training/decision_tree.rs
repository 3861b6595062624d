//! Decision tree implementation

use crate::error::{ChurnError, Result};
use crate::training::models::{check_prediction_width, check_training_data, normalize, Classifier};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Nodes this large scan their candidate features in parallel
const PARALLEL_SPLIT_MIN_SAMPLES: usize = 2048;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node holding the positive-class fraction
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

fn gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

/// Best split found on one feature: (feature, threshold, gain)
type SplitCandidate = (usize, f64, f64);

/// Binary Gini classification tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn per split (None = all)
    pub max_features: Option<usize>,
    /// Seed for the per-split feature draw
    pub seed: u64,
    /// Number of features
    n_features: usize,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
            n_features: 0,
            feature_importances: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set features drawn per split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<&mut Self> {
        check_training_data(x, y)?;
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.fit_rows(x, y, &indices)?;
        Ok(self)
    }

    /// Fit on a multiset of rows; repeated indices count once per repetition
    pub(crate) fn fit_rows(&mut self, x: &Array2<f64>, y: &Array1<i64>, rows: &[usize]) -> Result<()> {
        if rows.is_empty() {
            return Err(ChurnError::InsufficientData("tree fitted on no rows".to_string()));
        }
        self.n_features = x.ncols();

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut importances = vec![0.0; self.n_features];
        let mut rows = rows.to_vec();
        self.root = Some(self.build_tree(x, y, &mut rows, 0, &mut importances, &mut rng));
        self.feature_importances = Some(normalize(Array1::from_vec(importances)));
        Ok(())
    }

    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<i64>,
        rows: &mut [usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = rows.len();
        let positives = rows.iter().filter(|&&i| y[i] == 1).count();
        let value = positives as f64 / n_samples as f64;
        let impurity = gini(positives, n_samples);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || positives == 0
            || positives == n_samples;

        if should_stop {
            return TreeNode::Leaf { value, n_samples };
        }

        // Keep looking past the drawn subset until some feature separates the node
        let features = self.draw_features(rng);
        let best = self
            .find_best_split(x, y, rows, &features, positives, impurity)
            .or_else(|| {
                let rest: Vec<usize> = (0..self.n_features).filter(|f| !features.contains(f)).collect();
                self.find_best_split(x, y, rows, &rest, positives, impurity)
            });
        let Some((feature_idx, threshold, gain)) = best else {
            return TreeNode::Leaf { value, n_samples };
        };

        importances[feature_idx] += n_samples as f64 * gain;

        // Partition in place: rows with value <= threshold first
        let mut split_at = 0;
        for i in 0..rows.len() {
            if x[[rows[i], feature_idx]] <= threshold {
                rows.swap(i, split_at);
                split_at += 1;
            }
        }
        let (left_rows, right_rows) = rows.split_at_mut(split_at);

        let left = Box::new(self.build_tree(x, y, left_rows, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(x, y, right_rows, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    fn draw_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < self.n_features => {
                let mut drawn = index::sample(rng, self.n_features, k).into_vec();
                drawn.sort_unstable();
                drawn
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<i64>,
        rows: &[usize],
        features: &[usize],
        positives: usize,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let scan = |&feature_idx: &usize| {
            self.best_threshold(x, y, rows, feature_idx, positives, parent_impurity)
        };

        let per_feature: Vec<Option<SplitCandidate>> = if rows.len() >= PARALLEL_SPLIT_MIN_SAMPLES {
            features.par_iter().map(scan).collect()
        } else {
            features.iter().map(scan).collect()
        };

        // Strictly greater keeps the lowest feature index on ties
        per_feature.into_iter().flatten().fold(None, |best, cand| match best {
            Some(b) if b.2 >= cand.2 => Some(b),
            _ => Some(cand),
        })
    }

    /// Sorted sweep over one feature
    fn best_threshold(
        &self,
        x: &Array2<f64>,
        y: &Array1<i64>,
        rows: &[usize],
        feature_idx: usize,
        positives: usize,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let n = rows.len();
        let mut values: Vec<(f64, bool)> = rows
            .iter()
            .map(|&i| (x[[i, feature_idx]], y[i] == 1))
            .collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut best: Option<SplitCandidate> = None;
        let mut left_pos = 0usize;

        for i in 0..n - 1 {
            if values[i].1 {
                left_pos += 1;
            }
            let left_n = i + 1;
            let right_n = n - left_n;
            if values[i].0 == values[i + 1].0
                || left_n < self.min_samples_leaf
                || right_n < self.min_samples_leaf
            {
                continue;
            }

            let weighted = (left_n as f64 * gini(left_pos, left_n)
                + right_n as f64 * gini(positives - left_pos, right_n))
                / n as f64;
            let gain = parent_impurity - weighted;

            if gain > 1e-12 && best.map_or(true, |b| gain > b.2) {
                let threshold = (values[i].0 + values[i + 1].0) / 2.0;
                best = Some((feature_idx, threshold, gain));
            }
        }

        best
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(ChurnError::ModelNotFitted)?;
        check_prediction_width(x, self.n_features)?;
        Ok(x.rows().into_iter().map(|row| root.predict_row(row)).collect())
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    /// Get number of leaves
    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        DecisionTree::fit(self, x, y).map(|_| ())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_separable() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0, 0, 1, 1];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        assert_eq!(Classifier::predict(&tree, &x).unwrap(), y);
        assert_eq!(tree.get_depth(), 2);
        assert_eq!(tree.get_n_leaves(), 2);
    }

    #[test]
    fn test_xor_needs_depth_two() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0, 1, 1, 0];
        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();
        // No single split reduces Gini on XOR, so the root stays a leaf
        assert_eq!(tree.get_depth(), 1);
        assert_eq!(tree.predict_proba(&x).unwrap(), array![0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0], [5.0, 0.0]];
        let y = array![0, 1, 0, 1, 0];

        let mut tree = DecisionTree::new_classifier().with_max_depth(2);
        tree.fit(&x, &y).unwrap();
        assert!(tree.get_depth() <= 3);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![0, 1, 1, 1, 1, 1];
        let mut tree = DecisionTree::new_classifier().with_min_samples_leaf(2);
        tree.fit(&x, &y).unwrap();
        let proba = tree.predict_proba(&x).unwrap();
        // The lone negative cannot be isolated
        assert!(proba[0] > 0.0 && proba[0] < 1.0);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0, 0, 1, 1];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_predict_before_fit() {
        let tree = DecisionTree::new_classifier();
        assert!(matches!(
            tree.predict_proba(&array![[1.0]]),
            Err(ChurnError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let mut tree = DecisionTree::new_classifier();
        assert!(tree.fit(&array![[1.0], [2.0]], &array![0, 2]).is_err());
    }
}
