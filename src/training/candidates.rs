//! Candidate estimator definitions

use crate::error::Result;
use crate::training::lightgbm::{LightGBMClassifier, LightGBMConfig};
use crate::training::models::Classifier;
use crate::training::random_forest::{RandomForest, RandomForestConfig};
use crate::training::xgboost::{XGBoostClassifier, XGBoostConfig};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Estimator family plus its configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "params")]
pub enum EstimatorSpec {
    RandomForest(RandomForestConfig),
    XGBoost(XGBoostConfig),
    LightGBM(LightGBMConfig),
}

impl EstimatorSpec {
    /// Fresh, unfitted estimator for this spec
    pub fn build(&self) -> Estimator {
        match self {
            EstimatorSpec::RandomForest(c) => Estimator::RandomForest(RandomForest::new(c.clone())),
            EstimatorSpec::XGBoost(c) => Estimator::XGBoost(XGBoostClassifier::new(c.clone())),
            EstimatorSpec::LightGBM(c) => Estimator::LightGBM(LightGBMClassifier::new(c.clone())),
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            EstimatorSpec::RandomForest(_) => "RandomForest",
            EstimatorSpec::XGBoost(_) => "XGBoost",
            EstimatorSpec::LightGBM(_) => "LightGBM",
        }
    }
}

/// A named candidate in model selection. List order is the tie-break order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateModel {
    pub name: String,
    pub spec: EstimatorSpec,
}

impl CandidateModel {
    pub fn new(name: impl Into<String>, spec: EstimatorSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    /// Default candidate list: RandomForest, XGBoost, LightGBM, each seeded with `seed`
    pub fn defaults(seed: u64) -> Vec<CandidateModel> {
        vec![
            CandidateModel::new(
                "RandomForest",
                EstimatorSpec::RandomForest(RandomForestConfig {
                    random_state: seed,
                    ..Default::default()
                }),
            ),
            CandidateModel::new(
                "XGBoost",
                EstimatorSpec::XGBoost(XGBoostConfig {
                    random_state: seed,
                    ..Default::default()
                }),
            ),
            CandidateModel::new(
                "LightGBM",
                EstimatorSpec::LightGBM(LightGBMConfig {
                    random_state: seed,
                    ..Default::default()
                }),
            ),
        ]
    }

    pub fn build(&self) -> Estimator {
        self.spec.build()
    }

    /// Same candidate with its estimator seed replaced
    pub fn reseeded(&self, seed: u64) -> CandidateModel {
        let spec = match &self.spec {
            EstimatorSpec::RandomForest(c) => EstimatorSpec::RandomForest(RandomForestConfig {
                random_state: seed,
                ..c.clone()
            }),
            EstimatorSpec::XGBoost(c) => EstimatorSpec::XGBoost(XGBoostConfig {
                random_state: seed,
                ..c.clone()
            }),
            EstimatorSpec::LightGBM(c) => EstimatorSpec::LightGBM(LightGBMConfig {
                random_state: seed,
                ..c.clone()
            }),
        };
        CandidateModel::new(self.name.clone(), spec)
    }
}

/// Any fitted or unfitted candidate estimator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    RandomForest(RandomForest),
    XGBoost(XGBoostClassifier),
    LightGBM(LightGBMClassifier),
}

impl Estimator {
    fn as_classifier(&self) -> &dyn Classifier {
        match self {
            Estimator::RandomForest(m) => m,
            Estimator::XGBoost(m) => m,
            Estimator::LightGBM(m) => m,
        }
    }

    fn as_classifier_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Estimator::RandomForest(m) => m,
            Estimator::XGBoost(m) => m,
            Estimator::LightGBM(m) => m,
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            Estimator::RandomForest(_) => "RandomForest",
            Estimator::XGBoost(_) => "XGBoost",
            Estimator::LightGBM(_) => "LightGBM",
        }
    }
}

impl Classifier for Estimator {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        self.as_classifier_mut().fit(x, y)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_classifier().predict_proba(x)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        self.as_classifier().predict(x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.as_classifier().feature_importances()
    }
}
