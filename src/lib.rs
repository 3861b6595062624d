//! churnflow - Customer churn pipeline over web-session telemetry
//!
//! This crate turns raw analytics sessions into a deployable churn classifier:
//! - Session feature engineering with a frozen training median
//! - SMOTE class balancing on the training partition
//! - Stratified splitting and cross-validated model selection by F1
//! - Held-out evaluation with an optional feature-importance chart
//! - Atomic, checksummed, schema-bound model artifacts
//! - Schema-checked single and batch prediction
//!
//! # Modules
//!
//! - [`feature_engineering`] - Raw session parsing and the 12-field feature schema
//! - [`synthetic`] - SMOTE oversampling and the class balancer
//! - [`training`] - Candidate estimators, cross-validation, selection and evaluation
//! - [`export`] - Trained artifacts and their serializer
//! - [`inference`] - Serving-side prediction and batch scoring
//! - [`pipeline`] - The end-to-end training run
//! - [`config`] - Pipeline configuration
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Data processing
pub mod feature_engineering;
pub mod synthetic;

// Model lifecycle
pub mod training;
pub mod export;
pub mod inference;
pub mod pipeline;

// Services
pub mod cli;

pub use error::{ChurnError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::error::{ChurnError, Result};
    pub use crate::export::{ArtifactSerializer, FeatureSchema, TrainedArtifact};
    pub use crate::feature_engineering::{
        FeatureVector, LabeledTable, RawSessionRecord, SessionFeatureTransformer, FEATURE_NAMES,
    };
    pub use crate::inference::{BatchSummary, ChurnPredictor, PredictionReply};
    pub use crate::pipeline::{PipelineReport, TrainingPipeline};
    pub use crate::synthetic::{ClassBalancer, SMOTE};
    pub use crate::training::{
        CandidateModel, Classifier, EstimatorSpec, FinalEvaluator, ModelSelector, StratifiedKFold,
        StratifiedSplitter,
    };
}
