//! Schema-checked prediction against a loaded artifact

use crate::error::{ChurnError, Result};
use crate::export::{ArtifactSerializer, TrainedArtifact};
use crate::feature_engineering::{FeatureVector, RawSessionRecord, FEATURE_NAMES, N_FEATURES};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub const STAY_MESSAGE: &str = "Customer expected to stay";
pub const CHURN_MESSAGE: &str = "Customer at risk of churn";

/// Reply body of the serving boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionReply {
    Prediction { prediction: u8, message: String },
    Failure { error: String, detail: String },
}

impl PredictionReply {
    fn from_label(label: u8) -> Self {
        let message = if label == 1 { CHURN_MESSAGE } else { STAY_MESSAGE };
        PredictionReply::Prediction {
            prediction: label,
            message: message.to_string(),
        }
    }

    fn failure(detail: impl Into<String>) -> Self {
        PredictionReply::Failure {
            error: "prediction failed".to_string(),
            detail: detail.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PredictionReply::Failure { .. })
    }
}

/// Serves predictions from one artifact. Cheap to clone and share across threads.
#[derive(Debug, Clone)]
pub struct ChurnPredictor {
    artifact: Arc<TrainedArtifact>,
}

impl ChurnPredictor {
    pub fn new(artifact: TrainedArtifact) -> Result<Self> {
        Self::from_shared(Arc::new(artifact))
    }

    pub fn from_shared(artifact: Arc<TrainedArtifact>) -> Result<Self> {
        artifact.schema().verify()?;
        Ok(Self { artifact })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(ArtifactSerializer::load(path)?)
    }

    pub fn artifact(&self) -> &TrainedArtifact {
        &self.artifact
    }

    /// Predict a batch of feature rows already in schema order
    pub fn predict_matrix(&self, x: &Array2<f64>) -> Result<Vec<u8>> {
        if x.ncols() != N_FEATURES {
            return Err(ChurnError::InferenceSchemaMismatch(format!(
                "expected {} feature columns, got {}",
                N_FEATURES,
                x.ncols()
            )));
        }
        let labels = self.artifact.predict(x)?;
        Ok(labels.iter().map(|&l| u8::from(l == 1)).collect())
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<u8> {
        let x = Array2::from_shape_vec((1, N_FEATURES), features.to_array().to_vec())?;
        let label = self.predict_matrix(&x)?[0];
        debug!(prediction = label, "Predicted single row");
        Ok(label)
    }

    /// Predict from a name → value map whose keys must match the schema exactly
    pub fn predict_named(&self, values: &BTreeMap<String, f64>) -> Result<u8> {
        let missing: Vec<&str> = FEATURE_NAMES
            .iter()
            .copied()
            .filter(|name| !values.contains_key(*name))
            .collect();
        let unexpected: Vec<&str> = values
            .keys()
            .map(String::as_str)
            .filter(|key| !FEATURE_NAMES.contains(key))
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            let mut problems = Vec::new();
            if !missing.is_empty() {
                problems.push(format!("missing features: {}", missing.join(", ")));
            }
            if !unexpected.is_empty() {
                problems.push(format!("unexpected features: {}", unexpected.join(", ")));
            }
            return Err(ChurnError::InferenceSchemaMismatch(problems.join("; ")));
        }

        let ordered: Vec<f64> = FEATURE_NAMES.iter().map(|name| values[*name]).collect();
        self.predict(&FeatureVector::from_values(&ordered)?)
    }

    /// Derive features from a raw session with the frozen training median
    pub fn predict_session(&self, record: &RawSessionRecord) -> Result<u8> {
        let features = self.artifact.transformer().features(record)?;
        self.predict(&features)
    }

    /// Answer a JSON request. Only schema problems are described to the caller.
    pub fn respond(&self, request: &serde_json::Value) -> PredictionReply {
        match self.predict_json(request) {
            Ok(label) => PredictionReply::from_label(label),
            Err(ChurnError::InferenceSchemaMismatch(detail)) => {
                debug!(%detail, "Rejected request");
                PredictionReply::failure(detail)
            }
            Err(e) => {
                warn!(error = %e, "Prediction failed");
                PredictionReply::failure("internal error")
            }
        }
    }

    fn predict_json(&self, request: &serde_json::Value) -> Result<u8> {
        let object = request.as_object().ok_or_else(|| {
            ChurnError::InferenceSchemaMismatch("request must be a JSON object of feature values".to_string())
        })?;

        let mut values = BTreeMap::new();
        for (name, value) in object {
            let number = value.as_f64().ok_or_else(|| {
                ChurnError::InferenceSchemaMismatch(format!("feature '{}' is not a number", name))
            })?;
            values.insert(name.clone(), number);
        }
        self.predict_named(&values)
    }
}
