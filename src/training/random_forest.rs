//! Random Forest implementation

use crate::error::{ChurnError, Result};
use crate::training::decision_tree::DecisionTree;
use crate::training::models::{check_prediction_width, check_training_data, normalize, Classifier};
use ndarray::{Array1, Array2};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    /// Number of features drawn per split for a table of width `n_features`
    pub fn resolve(&self, n_features: usize) -> usize {
        let k = match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f) as usize,
            MaxFeatures::Fixed(k) => k,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Random Forest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: u64,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: 42,
        }
    }
}

/// Bagged ensemble of Gini trees; probabilities are averaged across trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: RandomForestConfig,
    /// Individual trees
    trees: Vec<DecisionTree>,
    /// Feature importances
    feature_importances: Option<Array1<f64>>,
    /// Number of features
    n_features: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(RandomForestConfig::default())
    }
}

impl RandomForest {
    pub fn new(config: RandomForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            feature_importances: None,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &RandomForestConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Fit the forest; tree `i` draws its bootstrap and features from seed `random_state + i`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        check_training_data(x, y)?;
        if self.config.n_estimators == 0 {
            return Err(ChurnError::InvalidParameter {
                name: "n_estimators".to_string(),
                value: "0".to_string(),
                reason: "forest needs at least one tree".to_string(),
            });
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();
        let max_features = self.config.max_features.resolve(n_features);
        let config = &self.config;

        let trees: Vec<DecisionTree> = (0..config.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.random_state.wrapping_add(tree_idx as u64));
                let rows: Vec<usize> = if config.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut tree = DecisionTree::new_classifier()
                    .with_min_samples_split(config.min_samples_split)
                    .with_min_samples_leaf(config.min_samples_leaf)
                    .with_max_features(max_features)
                    .with_seed(rng.next_u64());
                tree.max_depth = config.max_depth;

                tree.fit_rows(x, y, &rows)?;
                Ok(tree)
            })
            .collect::<Result<_>>()?;

        let mut importances = Array1::<f64>::zeros(n_features);
        for tree in &trees {
            if let Some(imp) = tree.feature_importances() {
                importances += imp;
            }
        }

        self.feature_importances = Some(normalize(importances / trees.len() as f64));
        self.trees = trees;
        self.n_features = n_features;
        Ok(())
    }

    /// Mean positive-class probability across trees
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ChurnError::ModelNotFitted);
        }
        check_prediction_width(x, self.n_features)?;

        let per_tree: Vec<Array1<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<_>>()?;

        let mut sum = Array1::<f64>::zeros(x.nrows());
        for proba in &per_tree {
            sum += proba;
        }
        Ok(sum / self.trees.len() as f64)
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        RandomForest::fit(self, x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict_proba(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification_data() -> (Array2<f64>, Array1<i64>) {
        let x = Array2::from_shape_fn((80, 4), |(i, j)| ((i * 7 + j * 13) % 17) as f64 + if j == 0 { i as f64 } else { 0.0 });
        let y = Array1::from_shape_fn(80, |i| i64::from(i >= 40));
        (x, y)
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(12), 3);
        assert_eq!(MaxFeatures::Log2.resolve(12), 3);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(12), 6);
        assert_eq!(MaxFeatures::Fixed(40).resolve(12), 12);
        assert_eq!(MaxFeatures::All.resolve(12), 12);
        assert_eq!(MaxFeatures::Fraction(0.01).resolve(12), 1);
    }

    #[test]
    fn test_random_forest_classifier() {
        let (x, y) = classification_data();
        let mut rf = RandomForest::new(RandomForestConfig {
            n_estimators: 20,
            ..Default::default()
        });
        rf.fit(&x, &y).unwrap();
        assert_eq!(rf.n_trees(), 20);

        let preds = Classifier::predict(&rf, &x).unwrap();
        let correct = preds.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct as f64 / y.len() as f64 > 0.9);
    }

    #[test]
    fn test_random_forest_deterministic() {
        let (x, y) = classification_data();
        let config = RandomForestConfig {
            n_estimators: 10,
            random_state: 7,
            ..Default::default()
        };
        let mut a = RandomForest::new(config.clone());
        let mut b = RandomForest::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_random_forest_importances_sum_to_one() {
        let (x, y) = classification_data();
        let mut rf = RandomForest::new(RandomForestConfig {
            n_estimators: 10,
            ..Default::default()
        });
        rf.fit(&x, &y).unwrap();
        let imp = rf.feature_importances().unwrap();
        assert_eq!(imp.len(), 4);
        assert!((imp.sum() - 1.0).abs() < 1e-9);
        // Feature 0 carries the row index, which separates the classes
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_random_forest_single_class() {
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i + j) as f64);
        let y = Array1::zeros(10);
        let mut rf = RandomForest::new(RandomForestConfig {
            n_estimators: 3,
            ..Default::default()
        });
        rf.fit(&x, &y).unwrap();
        assert!(rf.predict_proba(&x).unwrap().iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_predict_before_fit() {
        let rf = RandomForest::default();
        assert!(rf.predict_proba(&Array2::zeros((1, 2))).is_err());
    }
}
