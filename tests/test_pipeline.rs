//! Integration test: full training run, artifact reload and serving

use churnflow::config::PipelineConfig;
use churnflow::export::ArtifactSerializer;
use churnflow::feature_engineering::{FeatureVector, RawSessionRecord, SessionFeatureTransformer};
use churnflow::inference::{ChurnPredictor, PredictionReply, PREDICTION_COLUMN};
use churnflow::pipeline::TrainingPipeline;
use churnflow::training::{CandidateModel, EstimatorSpec, RandomForestConfig, StratifiedSplitter};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

const DEVICES: [&str; 4] = ["desktop", "mobile", "tablet", "desktop"];
const MEDIUMS: [&str; 4] = ["organic", "cpc", "referral", "(none)"];

fn raw_sessions(n: usize) -> DataFrame {
    let buyer = |i: usize| i % 4 == 0 || i % 9 == 0;
    let ids: Vec<String> = (0..n).map(|i| format!("visitor-{i:04}")).collect();
    let device: Vec<&str> = (0..n).map(|i| DEVICES[i % 4]).collect();
    let medium: Vec<&str> = (0..n).map(|i| MEDIUMS[(i / 2) % 4]).collect();
    let pageviews: Vec<i64> = (0..n)
        .map(|i| if buyer(i) { 6 + (i % 9) as i64 } else { 1 + (i % 5) as i64 })
        .collect();
    let time_on_site: Vec<Option<f64>> = (0..n)
        .map(|i| match i % 17 {
            0 => None,
            _ if buyer(i) => Some(200.0 + (i % 23) as f64 * 15.0),
            _ => Some((i % 19) as f64 * 6.0),
        })
        .collect();
    let transactions: Vec<i64> = (0..n).map(|i| i64::from(buyer(i))).collect();
    let revenue: Vec<f64> = (0..n)
        .map(|i| if buyer(i) { 20.0 + (i % 11) as f64 * 12.5 } else { 0.0 })
        .collect();

    df!(
        "fullVisitorId" => ids,
        "device" => device,
        "traffic_medium" => medium,
        "pageviews" => pageviews,
        "timeOnSite" => time_on_site,
        "transactions" => transactions,
        "transactionRevenue" => revenue
    )
    .unwrap()
}

fn write_raw(path: &Path, n: usize) {
    let mut df = raw_sessions(n);
    let mut file = File::create(path).unwrap();
    CsvWriter::new(&mut file).include_header(true).finish(&mut df).unwrap();
}

fn single_forest_config(dir: &Path) -> PipelineConfig {
    PipelineConfig::new()
        .with_raw_data_path(dir.join("raw.csv"))
        .with_processed_data_path(dir.join("data").join("processed.csv"))
        .with_artifact_path(dir.join("models").join("churn_model.bin"))
        .with_figures_dir(Some(dir.join("figures")))
        .with_candidates(vec![CandidateModel::new(
            "RandomForest",
            EstimatorSpec::RandomForest(RandomForestConfig {
                n_estimators: 20,
                ..Default::default()
            }),
        )])
}

#[test]
fn test_reloaded_artifact_reproduces_test_predictions() {
    let dir = tempfile::tempdir().unwrap();
    write_raw(&dir.path().join("raw.csv"), 240);
    let config = single_forest_config(dir.path());

    let report = TrainingPipeline::new(config.clone()).unwrap().run().unwrap();
    assert_eq!(report.winner, "RandomForest");
    assert_eq!(report.rows, 240);
    assert!(report.cv_f1 > 0.0);

    // Rebuild the exact test partition the evaluator saw
    let records = RawSessionRecord::read_csv(&config.raw_data_path).unwrap();
    let table = SessionFeatureTransformer::new().fit_transform(&records).unwrap();
    let (_, test) = StratifiedSplitter::new(config.test_fraction)
        .with_seed(config.seed)
        .split(&table)
        .unwrap();

    let predictor = ChurnPredictor::load(&config.artifact_path).unwrap();
    let reloaded: Vec<i64> = predictor
        .predict_matrix(test.x())
        .unwrap()
        .into_iter()
        .map(i64::from)
        .collect();
    assert_eq!(reloaded, report.evaluation.test_predictions.to_vec());

    assert!(config.processed_data_path.exists());
    let chart = report.evaluation.chart_path.expect("forest exposes importances");
    assert!(chart.exists());
}

#[test]
fn test_artifact_carries_frozen_schema() {
    let dir = tempfile::tempdir().unwrap();
    write_raw(&dir.path().join("raw.csv"), 200);
    let config = single_forest_config(dir.path()).with_figures_dir(None);

    let report = TrainingPipeline::new(config.clone()).unwrap().run().unwrap();
    let artifact = ArtifactSerializer::load(&config.artifact_path).unwrap();

    assert_eq!(artifact.model_name(), "RandomForest");
    assert_eq!(artifact.schema().ticket_medio_median, report.ticket_medio_median);
    assert_eq!(artifact.schema().feature_names.len(), 12);
    assert_eq!(artifact.cv_f1(), report.cv_f1);
    assert!(report.evaluation.chart_path.is_none());
}

#[test]
fn test_serving_and_batch_scoring_from_artifact() {
    let dir = tempfile::tempdir().unwrap();
    write_raw(&dir.path().join("raw.csv"), 200);
    let config = single_forest_config(dir.path()).with_figures_dir(None);
    TrainingPipeline::new(config.clone()).unwrap().run().unwrap();

    let predictor = ChurnPredictor::load(&config.artifact_path).unwrap();

    // A row from the processed table, sent as the JSON the serving boundary expects
    let records = RawSessionRecord::read_csv(&config.raw_data_path).unwrap();
    let transformer = predictor.artifact().transformer();
    let features: FeatureVector = transformer.features(&records[1]).unwrap();
    let request = serde_json::to_value(features).unwrap();

    let expected = predictor.predict(&features).unwrap();
    assert_eq!(predictor.predict_session(&records[1]).unwrap(), expected);
    match predictor.respond(&request) {
        PredictionReply::Prediction { prediction, .. } => assert_eq!(prediction, expected),
        other => panic!("unexpected reply {:?}", other),
    }

    let mut drifted = request.clone();
    drifted.as_object_mut().unwrap().remove("via_pago");
    assert!(predictor.respond(&drifted).is_failure());

    let scored_path = dir.path().join("scored.csv");
    let summary = predictor.score_csv(&config.processed_data_path, &scored_path).unwrap();
    assert_eq!(summary.rows, 200);
    assert!((summary.churn_pct + summary.stay_pct - 100.0).abs() < 1e-9);

    let scored = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(scored_path))
        .unwrap()
        .finish()
        .unwrap();
    assert!(scored.column(PREDICTION_COLUMN).is_ok());
    assert!(scored.column("churn").is_ok());
}

#[test]
fn test_process_only_writes_processed_table() {
    let dir = tempfile::tempdir().unwrap();
    write_raw(&dir.path().join("raw.csv"), 50);
    let config = single_forest_config(dir.path());

    let report = TrainingPipeline::new(config.clone()).unwrap().process().unwrap();
    assert_eq!(report.rows, 50);
    assert!(report.churn_rate > 0.0 && report.churn_rate < 1.0);
    assert!(config.processed_data_path.exists());
    assert!(!config.artifact_path.exists());
}
