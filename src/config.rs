//! Pipeline configuration

use crate::error::{ChurnError, Result};
use crate::training::CandidateModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Configuration for a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw session export (CSV)
    pub raw_data_path: PathBuf,

    /// Where the processed labeled-feature table is written
    pub processed_data_path: PathBuf,

    /// Where the trained artifact is written
    pub artifact_path: PathBuf,

    /// Diagnostic charts go here; `None` disables them
    pub figures_dir: Option<PathBuf>,

    /// Fraction of rows held out for final evaluation
    pub test_fraction: f64,

    /// Stratified folds used in model selection
    pub cv_folds: usize,

    /// Seed for splitting, fold shuffling and oversampling
    pub seed: u64,

    /// Neighbors considered when synthesizing minority rows
    pub smote_k_neighbors: usize,

    /// Candidates in tie-break order
    pub candidates: Vec<CandidateModel>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_data_path: PathBuf::from("data/ga_sessions_sample.csv"),
            processed_data_path: PathBuf::from("data/processed_sessions.csv"),
            artifact_path: PathBuf::from("models/churn_model.bin"),
            figures_dir: Some(PathBuf::from("figures")),
            test_fraction: 0.2,
            cv_folds: 5,
            seed: 42,
            smote_k_neighbors: 5,
            candidates: CandidateModel::defaults(42),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.raw_data_path = path.into();
        self
    }

    pub fn with_processed_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.processed_data_path = path.into();
        self
    }

    pub fn with_artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = path.into();
        self
    }

    pub fn with_figures_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.figures_dir = dir;
        self
    }

    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    /// Sets the run seed. Candidates keep whatever seeds they were built with.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_smote_k_neighbors(mut self, k: usize) -> Self {
        self.smote_k_neighbors = k;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<CandidateModel>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Keep only the named candidates, preserving their configured order
    pub fn retain_candidates(mut self, names: &[String]) -> Result<Self> {
        if let Some(unknown) = names.iter().find(|n| !self.candidates.iter().any(|c| &c.name == *n)) {
            return Err(ChurnError::ConfigError(format!(
                "unknown candidate '{}', expected one of: {}",
                unknown,
                self.candidate_names().join(", ")
            )));
        }
        self.candidates.retain(|c| names.contains(&c.name));
        Ok(self)
    }

    pub fn candidate_names(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.name.clone()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ChurnError::ConfigError(format!(
                "test_fraction must lie in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.cv_folds < 2 {
            return Err(ChurnError::ConfigError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if self.smote_k_neighbors == 0 {
            return Err(ChurnError::ConfigError("smote_k_neighbors must be positive".to_string()));
        }
        if self.candidates.is_empty() {
            return Err(ChurnError::ConfigError("at least one candidate is required".to_string()));
        }
        let mut seen = BTreeSet::new();
        for candidate in &self.candidates {
            if !seen.insert(candidate.name.as_str()) {
                return Err(ChurnError::ConfigError(format!(
                    "duplicate candidate name '{}'",
                    candidate.name
                )));
            }
        }
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            ChurnError::ConfigError(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cv_folds, 5);
        assert_eq!(config.test_fraction, 0.2);
        assert_eq!(config.candidate_names(), vec!["RandomForest", "XGBoost", "LightGBM"]);
    }

    #[test]
    fn test_validate_rejects() {
        assert!(PipelineConfig::new().with_test_fraction(1.0).validate().is_err());
        assert!(PipelineConfig::new().with_test_fraction(0.0).validate().is_err());
        assert!(PipelineConfig::new().with_cv_folds(1).validate().is_err());
        assert!(PipelineConfig::new().with_smote_k_neighbors(0).validate().is_err());
        assert!(PipelineConfig::new().with_candidates(vec![]).validate().is_err());

        let mut twice = CandidateModel::defaults(1);
        twice.push(twice[0].clone());
        assert!(PipelineConfig::new().with_candidates(twice).validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"cv_folds": 3, "figures_dir": null}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.cv_folds, 3);
        assert_eq!(config.figures_dir, None);
        assert_eq!(config.seed, 42);
        assert_eq!(config.candidates.len(), 3);
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = PipelineConfig::new().with_seed(7).with_cv_folds(4);
        config.to_json_file(&path).unwrap();
        assert_eq!(PipelineConfig::from_json_file(&path).unwrap(), config);
    }

    #[test]
    fn test_retain_candidates() {
        let config = PipelineConfig::new()
            .retain_candidates(&["LightGBM".to_string(), "RandomForest".to_string()])
            .unwrap();
        assert_eq!(config.candidate_names(), vec!["RandomForest", "LightGBM"]);
        assert!(PipelineConfig::new().retain_candidates(&["SVM".to_string()]).is_err());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(ChurnError::ConfigError(_))
        ));
    }
}
