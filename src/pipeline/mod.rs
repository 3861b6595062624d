//! End-to-end training run
//!
//! raw sessions → features → processed CSV → stratified split → SMOTE on the
//! train partition → cross-validated selection → held-out evaluation →
//! atomic artifact write. Any stage error aborts the run before an artifact
//! is written.

use crate::config::PipelineConfig;
use crate::error::{ChurnError, Result};
use crate::export::{ArtifactSerializer, TrainedArtifact};
use crate::feature_engineering::{LabeledTable, RawSessionRecord, SessionFeatureTransformer};
use crate::synthetic::ClassBalancer;
use crate::training::{
    CandidateFailure, EvaluationReport, FinalEvaluator, ModelScore, ModelSelector, StratifiedSplitter,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Result of the feature-only `process` step
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub rows: usize,
    pub churn_rate: f64,
    pub ticket_medio_median: f64,
    pub output: PathBuf,
}

/// Everything a training run learned
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub rows: usize,
    pub ticket_medio_median: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub class_counts_before: BTreeMap<i64, usize>,
    pub class_counts_after: BTreeMap<i64, usize>,
    pub n_synthetic: usize,
    pub scores: Vec<ModelScore>,
    pub failures: Vec<CandidateFailure>,
    pub winner: String,
    pub cv_f1: f64,
    pub evaluation: EvaluationReport,
    pub artifact_path: PathBuf,
    pub elapsed_secs: f64,
}

pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn featurize(&self, records: &[RawSessionRecord]) -> Result<(LabeledTable, f64)> {
        if records.is_empty() {
            return Err(ChurnError::InsufficientData("raw batch has no sessions".to_string()));
        }
        let mut transformer = SessionFeatureTransformer::new();
        let table = transformer.fit_transform(records)?;
        let median = transformer.ticket_median().ok_or(ChurnError::ModelNotFitted)?;

        table.write_csv(&self.config.processed_data_path)?;
        info!(
            rows = table.n_rows(),
            churn_rate = table.churn_rate(),
            path = %self.config.processed_data_path.display(),
            "Wrote processed table"
        );
        Ok((table, median))
    }

    /// Raw CSV → processed CSV, nothing else
    pub fn process(&self) -> Result<ProcessReport> {
        let records = RawSessionRecord::read_csv(&self.config.raw_data_path)?;
        info!(rows = records.len(), path = %self.config.raw_data_path.display(), "Loaded raw sessions");
        let (table, median) = self.featurize(&records)?;
        Ok(ProcessReport {
            rows: table.n_rows(),
            churn_rate: table.churn_rate(),
            ticket_medio_median: median,
            output: self.config.processed_data_path.clone(),
        })
    }

    /// Train from the configured raw CSV
    pub fn run(&self) -> Result<PipelineReport> {
        let records = RawSessionRecord::read_csv(&self.config.raw_data_path)?;
        info!(rows = records.len(), path = %self.config.raw_data_path.display(), "Loaded raw sessions");
        self.run_records(&records).map(|(report, _)| report)
    }

    /// Train from already parsed sessions; returns the report and the artifact as written
    pub fn run_records(&self, records: &[RawSessionRecord]) -> Result<(PipelineReport, TrainedArtifact)> {
        let start = Instant::now();
        let cfg = &self.config;

        let (table, median) = self.featurize(records)?;

        let (train, test) = StratifiedSplitter::new(cfg.test_fraction)
            .with_seed(cfg.seed)
            .split(&table)?;
        info!(train = train.n_rows(), test = test.n_rows(), "Split dataset");

        let class_counts_before = train.class_counts();
        let (balanced, n_synthetic) = ClassBalancer::new()
            .with_k_neighbors(cfg.smote_k_neighbors)
            .with_seed(cfg.seed)
            .balance(&train)?;

        let selection = ModelSelector::new(cfg.cv_folds)
            .with_seed(cfg.seed)
            .select(&balanced, &cfg.candidates)?;

        let mut evaluator = FinalEvaluator::new();
        if let Some(dir) = &cfg.figures_dir {
            evaluator = evaluator.with_figures_dir(dir);
        }
        let (estimator, evaluation) = evaluator.evaluate(&selection.winner, &balanced, &test)?;

        let artifact = TrainedArtifact::new(&selection.winner.name, estimator, median, selection.winner_f1);
        ArtifactSerializer::save(&artifact, &cfg.artifact_path)?;

        let report = PipelineReport {
            rows: table.n_rows(),
            ticket_medio_median: median,
            train_rows: train.n_rows(),
            test_rows: test.n_rows(),
            class_counts_after: balanced.class_counts(),
            class_counts_before,
            n_synthetic,
            scores: selection.scores,
            failures: selection.failures,
            winner: selection.winner.name,
            cv_f1: selection.winner_f1,
            evaluation,
            artifact_path: cfg.artifact_path.clone(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            winner = %report.winner,
            cv_f1 = report.cv_f1,
            test_f1 = report.evaluation.f1,
            elapsed_secs = report.elapsed_secs,
            "Training run complete"
        );
        Ok((report, artifact))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{CandidateModel, EstimatorSpec, RandomForestConfig};

    fn sessions(n: usize) -> Vec<RawSessionRecord> {
        (0..n)
            .map(|i| {
                let buyer = i % 4 == 0;
                RawSessionRecord {
                    device: Some(["desktop", "mobile", "tablet"][i % 3].to_string()),
                    traffic_medium: Some(["organic", "cpc", "referral"][i % 3].to_string()),
                    pageviews: Some(if buyer { 12 + (i % 7) as i64 } else { 1 + (i % 3) as i64 }),
                    time_on_site: Some(if buyer { 400.0 + i as f64 } else { 5.0 + (i % 11) as f64 }),
                    transactions: Some(i64::from(buyer)),
                    transaction_revenue: Some(if buyer { 50.0 + (i % 13) as f64 * 10.0 } else { 0.0 }),
                    ..Default::default()
                }
            })
            .collect()
    }

    fn config(dir: &std::path::Path) -> PipelineConfig {
        PipelineConfig::new()
            .with_processed_data_path(dir.join("processed.csv"))
            .with_artifact_path(dir.join("model.bin"))
            .with_figures_dir(None)
            .with_candidates(vec![CandidateModel::new(
                "RandomForest",
                EstimatorSpec::RandomForest(RandomForestConfig {
                    n_estimators: 10,
                    ..Default::default()
                }),
            )])
    }

    #[test]
    fn test_run_records_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TrainingPipeline::new(config(dir.path())).unwrap();
        let (report, artifact) = pipeline.run_records(&sessions(200)).unwrap();

        assert_eq!(report.rows, 200);
        assert_eq!(report.train_rows + report.test_rows, 200);
        assert_eq!(report.test_rows, 40);
        assert_eq!(report.class_counts_before[&1], 120);
        assert_eq!(report.class_counts_after[&0], report.class_counts_after[&1]);
        assert_eq!(report.n_synthetic, 120 - 40);
        assert_eq!(report.winner, "RandomForest");
        assert_eq!(report.evaluation.confusion.total(), 40);
        assert_eq!(artifact.model_name(), "RandomForest");
        assert!(dir.path().join("processed.csv").exists());
        assert!(dir.path().join("model.bin").exists());
    }

    #[test]
    fn test_empty_batch_aborts_without_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TrainingPipeline::new(config(dir.path())).unwrap();
        assert!(matches!(pipeline.run_records(&[]), Err(ChurnError::InsufficientData(_))));
        assert!(!dir.path().join("model.bin").exists());
    }

    #[test]
    fn test_too_few_rows_per_fold_aborts() {
        let dir = tempfile::tempdir().unwrap();
        // 24 sessions balance to 14 + 14 train rows, fewer than 20 folds need
        let pipeline = TrainingPipeline::new(config(dir.path()).with_cv_folds(20)).unwrap();
        let err = pipeline.run_records(&sessions(24)).unwrap_err();
        assert!(matches!(err, ChurnError::InsufficientData(_)));
        assert!(!dir.path().join("model.bin").exists());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(TrainingPipeline::new(PipelineConfig::new().with_cv_folds(0)).is_err());
    }
}
