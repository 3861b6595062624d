//! LightGBM-style gradient boosting with leaf-wise tree growth
//!
//! Key differences from XGBoost-style boosting:
//! - Leaf-wise (best-first) tree growth bounded by `max_leaves` instead of level-wise depth
//! - Optional Gradient-based One-Side Sampling (GOSS): keeps the largest gradients,
//!   samples the rest and up-weights them to stay unbiased

use crate::error::{ChurnError, Result};
use crate::training::models::{check_prediction_width, check_training_data, normalize, Classifier};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Row sampling used per boosting round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoostingType {
    /// Every row (or a `subsample` fraction) each round
    Gbdt,
    /// Gradient-based One-Side Sampling
    Goss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightGBMConfig {
    pub boosting: BoostingType,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    /// Minimum hessian sum per leaf
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub top_rate: f64,
    pub other_rate: f64,
    pub random_state: u64,
}

impl Default for LightGBMConfig {
    fn default() -> Self {
        Self {
            boosting: BoostingType::Gbdt,
            n_estimators: 100,
            learning_rate: 0.1,
            max_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            min_child_weight: 1e-3,
            reg_lambda: 0.0,
            reg_alpha: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            top_rate: 0.2,
            other_rate: 0.1,
            random_state: 42,
        }
    }
}

impl LightGBMConfig {
    fn validate(&self) -> Result<()> {
        let invalid = |name: &str, value: String, reason: &str| ChurnError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        };
        if self.max_leaves < 2 {
            return Err(invalid("max_leaves", self.max_leaves.to_string(), "must be at least 2"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", self.learning_rate.to_string(), "must be positive"));
        }
        if self.boosting == BoostingType::Goss
            && !(self.top_rate > 0.0 && self.other_rate > 0.0 && self.top_rate + self.other_rate <= 1.0)
        {
            return Err(invalid(
                "top_rate + other_rate",
                format!("{} + {}", self.top_rate, self.other_rate),
                "GOSS rates must be positive and sum to at most 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum LGBNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<LGBNode>,
        right: Box<LGBNode>,
    },
}

impl LGBNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        match self {
            LGBNode::Leaf { value } => *value,
            LGBNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }

    fn count_splits(&self, counts: &mut Array1<f64>) {
        if let LGBNode::Split {
            feature, left, right, ..
        } = self
        {
            counts[*feature] += 1.0;
            left.count_splits(counts);
            right.count_splits(counts);
        }
    }
}

// ---- Tree building utilities ----

fn compute_leaf_weight(g: f64, h: f64, lambda: f64, alpha: f64) -> f64 {
    let g_adj = if g.abs() <= alpha { 0.0 } else { g - alpha * g.signum() };
    -g_adj / (h + lambda).max(1e-16)
}

fn compute_gain_single(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda).max(1e-16)
}

fn make_leaf(gradients: &[f64], hessians: &[f64], indices: &[usize], config: &LightGBMConfig) -> LGBNode {
    let g: f64 = indices.iter().map(|&i| gradients[i]).sum();
    let h: f64 = indices.iter().map(|&i| hessians[i]).sum();
    LGBNode::Leaf {
        value: compute_leaf_weight(g, h, config.reg_lambda, config.reg_alpha),
    }
}

/// A leaf waiting to be split, ordered by gain then by creation order
struct PendingSplit {
    gain: f64,
    node_id: usize,
    feature: usize,
    threshold: f64,
    left_indices: Vec<usize>,
    right_indices: Vec<usize>,
}

impl PartialEq for PendingSplit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for PendingSplit {}
impl PartialOrd for PendingSplit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingSplit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain
            .total_cmp(&other.gain)
            .then_with(|| other.node_id.cmp(&self.node_id))
    }
}

enum NodeSlot {
    Leaf(Vec<usize>),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    gradients: &'a [f64],
    hessians: &'a [f64],
    features: Vec<usize>,
    config: &'a LightGBMConfig,
}

impl TreeBuilder<'_> {
    fn best_split_for_feature(&self, indices: &[usize], feature: usize) -> Option<(f64, f64, usize, Vec<usize>)> {
        let mut sorted: Vec<(f64, usize)> = indices.iter().map(|&i| (self.x[[i, feature]], i)).collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total_g: f64 = indices.iter().map(|&i| self.gradients[i]).sum();
        let total_h: f64 = indices.iter().map(|&i| self.hessians[i]).sum();
        let lambda = self.config.reg_lambda;
        let parent = compute_gain_single(total_g, total_h, lambda);
        let min_child = self.config.min_child_samples.max(1);

        let mut left_g = 0.0;
        let mut left_h = 0.0;
        let mut best: Option<(f64, f64, usize)> = None;

        for i in 0..sorted.len().saturating_sub(1) {
            let idx = sorted[i].1;
            left_g += self.gradients[idx];
            left_h += self.hessians[idx];

            let left_n = i + 1;
            let right_n = sorted.len() - left_n;
            if left_n < min_child || right_n < min_child || sorted[i].0 == sorted[i + 1].0 {
                continue;
            }
            let right_h = total_h - left_h;
            if left_h < self.config.min_child_weight || right_h < self.config.min_child_weight {
                continue;
            }

            let gain = compute_gain_single(left_g, left_h, lambda)
                + compute_gain_single(total_g - left_g, right_h, lambda)
                - parent;

            if best.map_or(true, |b| gain > b.1) {
                best = Some(((sorted[i].0 + sorted[i + 1].0) / 2.0, gain, left_n));
            }
        }

        let (threshold, gain, split_pos) = best.filter(|b| b.1 > 0.0)?;
        let ordered = sorted.into_iter().map(|(_, i)| i).collect();
        Some((threshold, gain, split_pos, ordered))
    }

    fn find_split(&self, node_id: usize, indices: &[usize]) -> Option<PendingSplit> {
        if indices.len() < self.config.min_child_samples.max(1) * 2 {
            return None;
        }
        let candidates: Vec<_> = self
            .features
            .par_iter()
            .filter_map(|&feat| self.best_split_for_feature(indices, feat).map(|s| (feat, s)))
            .collect();

        let (feature, (threshold, gain, split_pos, ordered)) =
            candidates.into_iter().fold(None, |best: Option<(usize, (f64, f64, usize, Vec<usize>))>, cand| {
                match best {
                    Some(b) if b.1 .1 >= cand.1 .1 => Some(b),
                    _ => Some(cand),
                }
            })?;

        let (left, right) = ordered.split_at(split_pos);
        Some(PendingSplit {
            gain,
            node_id,
            feature,
            threshold,
            left_indices: left.to_vec(),
            right_indices: right.to_vec(),
        })
    }

    /// Grow one tree leaf-wise from the sampled rows
    fn build(&self, indices: &[usize]) -> LGBNode {
        let mut nodes: Vec<NodeSlot> = vec![NodeSlot::Leaf(indices.to_vec())];
        let mut depths: Vec<usize> = vec![0];
        let mut heap: BinaryHeap<PendingSplit> = BinaryHeap::new();
        let max_depth = self.config.max_depth.unwrap_or(usize::MAX);

        if max_depth > 0 {
            heap.extend(self.find_split(0, indices));
        }

        let mut n_leaves = 1usize;
        while n_leaves < self.config.max_leaves {
            let Some(split) = heap.pop() else { break };

            let depth = depths[split.node_id] + 1;
            let left_id = nodes.len();
            let right_id = left_id + 1;

            if depth < max_depth {
                heap.extend(self.find_split(left_id, &split.left_indices));
                heap.extend(self.find_split(right_id, &split.right_indices));
            }

            nodes.push(NodeSlot::Leaf(split.left_indices));
            nodes.push(NodeSlot::Leaf(split.right_indices));
            depths.push(depth);
            depths.push(depth);
            nodes[split.node_id] = NodeSlot::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: left_id,
                right: right_id,
            };
            n_leaves += 1;
        }

        self.to_node(&nodes, 0)
    }

    fn to_node(&self, nodes: &[NodeSlot], idx: usize) -> LGBNode {
        match &nodes[idx] {
            NodeSlot::Leaf(indices) => make_leaf(self.gradients, self.hessians, indices, self.config),
            NodeSlot::Split {
                feature,
                threshold,
                left,
                right,
            } => LGBNode::Split {
                feature: *feature,
                threshold: *threshold,
                left: Box::new(self.to_node(nodes, *left)),
                right: Box::new(self.to_node(nodes, *right)),
            },
        }
    }
}

/// GOSS row sample: top `top_rate` by |gradient| plus a random `other_rate`
/// share of the rest, returned with per-row weights for the sampled rest
fn goss_sample(
    gradients: &[f64],
    top_rate: f64,
    other_rate: f64,
    rng: &mut Xoshiro256PlusPlus,
) -> (Vec<usize>, Vec<f64>) {
    let n = gradients.len();
    let n_top = ((n as f64 * top_rate).ceil() as usize).min(n);
    let n_other = ((n as f64 * other_rate).ceil() as usize).min(n - n_top);

    let mut sorted: Vec<usize> = (0..n).collect();
    sorted.sort_by(|&a, &b| gradients[b].abs().total_cmp(&gradients[a].abs()).then(a.cmp(&b)));

    let mut weights = vec![1.0; n];
    let amplify = (1.0 - top_rate) / other_rate;
    let mut selected: Vec<usize> = sorted[..n_top].to_vec();
    let mut remaining: Vec<usize> = sorted[n_top..].to_vec();
    remaining.shuffle(rng);
    for &i in remaining.iter().take(n_other) {
        weights[i] = amplify;
        selected.push(i);
    }
    selected.sort_unstable();
    (selected, weights)
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// LightGBM Classifier (binary logistic objective)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMClassifier {
    config: LightGBMConfig,
    trees: Vec<LGBNode>,
    base_prediction: f64,
    n_features: usize,
}

impl Default for LightGBMClassifier {
    fn default() -> Self {
        Self::new(LightGBMConfig::default())
    }
}

impl LightGBMClassifier {
    pub fn new(config: LightGBMConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_prediction: 0.0,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &LightGBMConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn row_sample(&self, gradients: &[f64], rng: &mut Xoshiro256PlusPlus) -> (Vec<usize>, Vec<f64>) {
        let n = gradients.len();
        match self.config.boosting {
            BoostingType::Goss => goss_sample(gradients, self.config.top_rate, self.config.other_rate, rng),
            BoostingType::Gbdt if self.config.subsample < 1.0 => {
                let k = ((n as f64 * self.config.subsample).ceil() as usize).max(1);
                let mut idx: Vec<usize> = (0..n).collect();
                idx.shuffle(rng);
                idx.truncate(k);
                idx.sort_unstable();
                (idx, vec![1.0; n])
            }
            BoostingType::Gbdt => ((0..n).collect(), vec![1.0; n]),
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_training_data(x, y)?;
        self.config.validate()?;

        let n = x.nrows();
        let n_features = x.ncols();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);

        // Log-odds of the clamped positive rate; a single-class set stays finite
        let pos = y.iter().filter(|&&v| v == 1).count() as f64;
        let p = (pos / n as f64).clamp(1e-7, 1.0 - 1e-7);
        let base_prediction = (p / (1.0 - p)).ln();
        let mut raw = Array1::from_elem(n, base_prediction);

        let n_selected = ((n_features as f64 * self.config.colsample_bytree).ceil() as usize).clamp(1, n_features);
        let mut trees = Vec::with_capacity(self.config.n_estimators);

        for _ in 0..self.config.n_estimators {
            let probs: Vec<f64> = raw.iter().map(|&r| sigmoid(r)).collect();
            let mut gradients: Vec<f64> = probs.iter().zip(y.iter()).map(|(&p, &yi)| p - yi as f64).collect();
            let mut hessians: Vec<f64> = probs.iter().map(|&p| (p * (1.0 - p)).max(1e-16)).collect();

            let (indices, weights) = self.row_sample(&gradients, &mut rng);
            for &i in &indices {
                gradients[i] *= weights[i];
                hessians[i] *= weights[i];
            }

            let mut features: Vec<usize> = (0..n_features).collect();
            if n_selected < n_features {
                features.shuffle(&mut rng);
                features.truncate(n_selected);
                features.sort_unstable();
            }

            let builder = TreeBuilder {
                x,
                gradients: &gradients,
                hessians: &hessians,
                features,
                config: &self.config,
            };
            let tree = builder.build(&indices);

            for (i, row) in x.rows().into_iter().enumerate() {
                raw[i] += self.config.learning_rate * tree.predict(row);
            }
            if raw.iter().any(|v| !v.is_finite()) {
                return Err(ChurnError::ComputationError(
                    "boosting produced non-finite margins".to_string(),
                ));
            }
            trees.push(tree);
        }

        self.trees = trees;
        self.base_prediction = base_prediction;
        self.n_features = n_features;
        Ok(())
    }

    fn predict_raw(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.n_features == 0 {
            return Err(ChurnError::ModelNotFitted);
        }
        check_prediction_width(x, self.n_features)?;
        let lr = self.config.learning_rate;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.base_prediction + self.trees.iter().map(|t| lr * t.predict(row)).sum::<f64>())
            .collect())
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_raw(x)?.mapv(sigmoid))
    }

    /// Split-count importances across all trees
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.n_features == 0 {
            return None;
        }
        let mut counts = Array1::zeros(self.n_features);
        for tree in &self.trees {
            tree.count_splits(&mut counts);
        }
        Some(normalize(counts))
    }
}

impl Classifier for LightGBMClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        LightGBMClassifier::fit(self, x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LightGBMClassifier::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        LightGBMClassifier::feature_importances(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_classification_data() -> (Array2<f64>, Array1<i64>) {
        let x = Array2::from_shape_vec((100, 2), (0..200).map(|i| (i as f64) / 100.0).collect()).unwrap();
        let y = Array1::from_shape_fn(100, |i| i64::from(i >= 50));
        (x, y)
    }

    fn accuracy(model: &LightGBMClassifier, x: &Array2<f64>, y: &Array1<i64>) -> f64 {
        let preds = Classifier::predict(model, x).unwrap();
        preds.iter().zip(y.iter()).filter(|(p, t)| p == t).count() as f64 / y.len() as f64
    }

    #[test]
    fn test_lightgbm_classifier() {
        let (x, y) = make_classification_data();
        let config = LightGBMConfig {
            n_estimators: 30,
            max_leaves: 8,
            min_child_samples: 2,
            ..Default::default()
        };
        let mut model = LightGBMClassifier::new(config);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_trees(), 30);
        let acc = accuracy(&model, &x, &y);
        assert!(acc > 0.95, "Accuracy too low: {}", acc);
    }

    #[test]
    fn test_lightgbm_predict_proba() {
        let (x, y) = make_classification_data();
        let config = LightGBMConfig {
            n_estimators: 10,
            max_leaves: 8,
            min_child_samples: 2,
            ..Default::default()
        };
        let mut model = LightGBMClassifier::new(config);
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|&p| p > 0.0 && p < 1.0));
        assert!(proba[99] > proba[0]);
    }

    #[test]
    fn test_lightgbm_goss() {
        let (x, y) = make_classification_data();
        let config = LightGBMConfig {
            boosting: BoostingType::Goss,
            n_estimators: 20,
            max_leaves: 8,
            min_child_samples: 2,
            top_rate: 0.3,
            other_rate: 0.2,
            ..Default::default()
        };
        let mut model = LightGBMClassifier::new(config);
        model.fit(&x, &y).unwrap();
        assert!(accuracy(&model, &x, &y) > 0.9);
    }

    #[test]
    fn test_goss_sample_weights() {
        let grads: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let (idx, w) = goss_sample(&grads, 0.2, 0.2, &mut rng);
        assert_eq!(idx.len(), 4);
        assert!(idx.contains(&9) && idx.contains(&8));
        assert_eq!(w[9], 1.0);
        let amplified = idx.iter().filter(|&&i| w[i] == 4.0).count();
        assert_eq!(amplified, 2);
    }

    #[test]
    fn test_lightgbm_single_class_is_constant() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| (i + j) as f64);
        let y = Array1::zeros(30);
        let mut model = LightGBMClassifier::default();
        model.fit(&x, &y).unwrap();
        assert!(model.predict_proba(&x).unwrap().iter().all(|&p| p < 0.01));
    }

    #[test]
    fn test_small_node_stays_leaf() {
        // Fewer rows than 2 * min_child_samples: every tree is a single leaf
        let (x, y) = make_classification_data();
        let mut model = LightGBMClassifier::new(LightGBMConfig {
            n_estimators: 5,
            min_child_samples: 60,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        let imp = model.feature_importances().unwrap();
        assert_eq!(imp.sum(), 0.0);
    }

    #[test]
    fn test_invalid_goss_rates() {
        let (x, y) = make_classification_data();
        let mut model = LightGBMClassifier::new(LightGBMConfig {
            boosting: BoostingType::Goss,
            top_rate: 0.8,
            other_rate: 0.5,
            ..Default::default()
        });
        assert!(model.fit(&x, &y).is_err());
    }
}
