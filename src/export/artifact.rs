//! Schema-bound trained model

use crate::error::{ChurnError, Result};
use crate::feature_engineering::{SessionFeatureTransformer, FEATURE_NAMES, N_FEATURES};
use crate::training::{Classifier, Estimator};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Bumped whenever the feature list, order or derivation changes
pub const SCHEMA_VERSION: u32 = 1;

/// The feature contract a model was trained against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub feature_names: Vec<String>,
    /// Training-time median of `ticket_medio`, frozen for inference
    pub ticket_medio_median: f64,
}

impl FeatureSchema {
    /// The schema compiled into this build
    pub fn current(ticket_medio_median: f64) -> Self {
        Self {
            version: SCHEMA_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            ticket_medio_median,
        }
    }

    /// Check a loaded schema against the compiled one
    pub fn verify(&self) -> Result<()> {
        if self.version != SCHEMA_VERSION {
            return Err(ChurnError::InferenceSchemaMismatch(format!(
                "artifact schema version {} does not match supported version {}",
                self.version, SCHEMA_VERSION
            )));
        }
        if self.feature_names.len() != N_FEATURES
            || self.feature_names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(ChurnError::InferenceSchemaMismatch(format!(
                "artifact features [{}] do not match expected [{}]",
                self.feature_names.join(", "),
                FEATURE_NAMES.join(", ")
            )));
        }
        if !self.ticket_medio_median.is_finite() {
            return Err(ChurnError::InferenceSchemaMismatch(
                "artifact carries a non-finite ticket_medio median".to_string(),
            ));
        }
        Ok(())
    }
}

/// A fitted estimator bound to its training schema. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedArtifact {
    schema: FeatureSchema,
    model_name: String,
    estimator: Estimator,
    cv_f1: f64,
    trained_at: DateTime<Utc>,
}

impl TrainedArtifact {
    pub fn new(model_name: impl Into<String>, estimator: Estimator, ticket_medio_median: f64, cv_f1: f64) -> Self {
        Self {
            schema: FeatureSchema::current(ticket_medio_median),
            model_name: model_name.into(),
            estimator,
            cv_f1,
            trained_at: Utc::now(),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn family(&self) -> &'static str {
        self.estimator.family()
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn cv_f1(&self) -> f64 {
        self.cv_f1
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Feature transformer carrying the frozen training median
    pub fn transformer(&self) -> SessionFeatureTransformer {
        SessionFeatureTransformer::with_ticket_median(self.schema.ticket_medio_median)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        self.estimator.predict(x)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.estimator.predict_proba(x)
    }

    #[cfg(test)]
    pub(crate) fn with_schema(mut self, schema: FeatureSchema) -> Self {
        self.schema = schema;
        self
    }
}
