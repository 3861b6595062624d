//! Model training module
//!
//! Provides the candidate estimators and the machinery that picks among them:
//! - Decision trees and Random Forests
//! - XGBoost-style and LightGBM-style gradient boosting
//! - Stratified splitting and k-fold cross-validation
//! - Cross-validated model selection and held-out evaluation

mod models;
pub mod candidates;
pub mod cross_validation;
pub mod decision_tree;
pub mod evaluator;
pub mod lightgbm;
pub mod random_forest;
pub mod selector;
pub mod xgboost;

pub use candidates::{CandidateModel, Estimator, EstimatorSpec};
pub use cross_validation::{CVSplit, StratifiedKFold, StratifiedSplitter};
pub use decision_tree::{DecisionTree, TreeNode};
pub use evaluator::{EvaluationReport, FeatureImportance, FinalEvaluator};
pub use lightgbm::{BoostingType, LightGBMClassifier, LightGBMConfig};
pub use models::{f1_score, ClassMetrics, ClassificationReport, Classifier, ConfusionMatrix};
pub use random_forest::{MaxFeatures, RandomForest, RandomForestConfig};
pub use selector::{CandidateFailure, ModelScore, ModelSelector, Selection};
pub use xgboost::{XGBoostClassifier, XGBoostConfig};
