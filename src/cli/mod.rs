//! churnflow CLI Module
//!
//! Command-line interface for processing sessions, training, prediction and batch scoring.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::export::ArtifactSerializer;
use crate::inference::{BatchSummary, ChurnPredictor, PredictionReply};
use crate::pipeline::{PipelineReport, TrainingPipeline};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv_line(key: &str, val: impl std::fmt::Display) {
    println!("  {:<16} {}", muted(key), val.to_string().white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "churnflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Customer churn pipeline: session features, SMOTE, cross-validated model selection")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Overrides for the training run; unset flags keep config-file values
#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// JSON pipeline config
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Raw session CSV
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Output artifact file
    #[arg(short, long)]
    pub artifact: Option<PathBuf>,

    /// Output processed-table CSV
    #[arg(long)]
    pub processed: Option<PathBuf>,

    /// Directory for diagnostic charts
    #[arg(long)]
    pub figures: Option<PathBuf>,

    /// Skip diagnostic charts
    #[arg(long, conflicts_with = "figures")]
    pub no_figures: bool,

    /// Number of cross-validation folds
    #[arg(long)]
    pub folds: Option<usize>,

    /// Seed for splitting, oversampling and the estimators
    #[arg(long)]
    pub seed: Option<u64>,

    /// Held-out fraction for final evaluation
    #[arg(long)]
    pub test_fraction: Option<f64>,

    /// Restrict selection to these candidates (repeatable)
    #[arg(long = "candidate")]
    pub candidates: Vec<String>,
}

impl TrainArgs {
    pub fn resolve(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(data) = &self.data {
            config = config.with_raw_data_path(data);
        }
        if let Some(artifact) = &self.artifact {
            config = config.with_artifact_path(artifact);
        }
        if let Some(processed) = &self.processed {
            config = config.with_processed_data_path(processed);
        }
        if let Some(figures) = &self.figures {
            config = config.with_figures_dir(Some(figures.clone()));
        }
        if self.no_figures {
            config = config.with_figures_dir(None);
        }
        if let Some(folds) = self.folds {
            config = config.with_cv_folds(folds);
        }
        if let Some(seed) = self.seed {
            let reseeded = config.candidates.iter().map(|c| c.reseeded(seed)).collect();
            config = config.with_seed(seed).with_candidates(reseeded);
        }
        if let Some(fraction) = self.test_fraction {
            config = config.with_test_fraction(fraction);
        }
        if !self.candidates.is_empty() {
            config = config.retain_candidates(&self.candidates)?;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Derive the processed feature table from a raw session export
    Process {
        /// Raw session CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Output processed-table CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run the full training pipeline and write the model artifact
    Train(TrainArgs),

    /// Predict a single feature row with a trained artifact
    Predict {
        /// Trained artifact file
        #[arg(short, long)]
        artifact: PathBuf,

        /// Feature values as a JSON object
        #[arg(short, long, conflicts_with = "features_file", required_unless_present = "features_file")]
        features: Option<String>,

        /// File holding the JSON feature object
        #[arg(long)]
        features_file: Option<PathBuf>,
    },

    /// Score a processed CSV and append a churn_prediction column
    Score {
        /// Trained artifact file
        #[arg(short, long)]
        artifact: PathBuf,

        /// Processed CSV to score
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show what a trained artifact contains
    Info {
        /// Trained artifact file
        #[arg(short, long)]
        artifact: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_process(data_path: &Path, output_path: &Path) -> anyhow::Result<()> {
    section("Process");

    let config = PipelineConfig::default()
        .with_raw_data_path(data_path)
        .with_processed_data_path(output_path);
    let pipeline = TrainingPipeline::new(config)?;

    step_run(&format!("Deriving features from {}", data_path.display()));
    let start = Instant::now();
    let report = pipeline.process()?;
    step_done(&format!("{} rows in {:?}", report.rows, start.elapsed()));

    println!();
    kv_line("Rows", report.rows);
    kv_line("Churn rate", format!("{:.1}%", report.churn_rate * 100.0));
    kv_line("Ticket median", format!("{:.2}", report.ticket_medio_median));
    kv_line("Output", report.output.display());
    println!();
    Ok(())
}

pub fn cmd_train(args: &TrainArgs) -> anyhow::Result<()> {
    section("Train");

    let config = args.resolve()?;
    kv_line("Data", config.raw_data_path.display());
    kv_line("Candidates", config.candidate_names().join(", "));
    kv_line("Folds", config.cv_folds);
    kv_line("Seed", config.seed);
    println!();

    let pipeline = TrainingPipeline::new(config)?;
    step_run("Running pipeline");
    let start = Instant::now();
    let report = pipeline.run()?;
    step_done(&format!("{:.2?}", start.elapsed()));

    print_train_report(&report);
    Ok(())
}

fn print_train_report(report: &PipelineReport) {
    section("Data");
    kv_line("Sessions", report.rows);
    kv_line("Train / test", format!("{} / {}", report.train_rows, report.test_rows));
    kv_line("Before SMOTE", format!("{:?}", report.class_counts_before));
    kv_line("After SMOTE", format!("{:?}", report.class_counts_after));
    kv_line("Synthetic", report.n_synthetic);

    section("Candidates");
    println!("  {:<24} {:>10} {:>10}", muted("Model"), muted("CV F1"), muted("Folds"));
    println!("  {}", dim(&"─".repeat(46)));
    for score in &report.scores {
        let name = if score.name == report.winner {
            score.name.white().bold()
        } else {
            score.name.normal()
        };
        println!("  {:<24} {:>10.4} {:>10}", name, score.mean_f1, score.fold_scores.len());
    }
    for failure in &report.failures {
        println!("  {:<24} {:>10}", failure.name, format!("err: {}", failure.reason).red());
    }

    println!();
    println!(
        "  {} {} {} {:.4}",
        ok("best"),
        report.winner.white().bold(),
        muted("cv f1:"),
        report.cv_f1
    );

    let eval = &report.evaluation;
    section("Held-out evaluation");
    println!("  {:<14} {:>10} {:>10}", "", muted("pred 0"), muted("pred 1"));
    println!(
        "  {:<14} {:>10} {:>10}",
        muted("true 0"),
        eval.confusion.true_negatives(),
        eval.confusion.false_positives()
    );
    println!(
        "  {:<14} {:>10} {:>10}",
        muted("true 1"),
        eval.confusion.false_negatives(),
        eval.confusion.true_positives()
    );
    println!();
    for line in eval.report.to_string().lines() {
        println!("  {}", line);
    }

    let top = eval.top_importances(5);
    if !top.is_empty() {
        section("Top features");
        for f in top {
            println!("  {:<24} {:>10.4}", f.feature, f.importance);
        }
    }

    println!();
    step_ok(&format!("artifact → {}", report.artifact_path.display()));
    if let Some(chart) = &eval.chart_path {
        step_ok(&format!("chart → {}", chart.display()));
    }
    println!();
}

pub fn cmd_predict(artifact: &Path, features: Option<&str>, features_file: Option<&Path>) -> anyhow::Result<()> {
    let text = match (features, features_file) {
        (Some(json), _) => json.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => anyhow::bail!("either --features or --features-file is required"),
    };
    let request: serde_json::Value = serde_json::from_str(&text)?;

    let predictor = ChurnPredictor::load(artifact)?;
    let reply = predictor.respond(&request);
    println!("{}", serde_json::to_string_pretty(&reply)?);

    if let PredictionReply::Failure { detail, .. } = reply {
        anyhow::bail!("prediction failed: {}", detail);
    }
    Ok(())
}

pub fn cmd_score(artifact: &Path, data: &Path, output: &Path) -> anyhow::Result<()> {
    section("Score");

    step_run("Loading artifact");
    let predictor = ChurnPredictor::load(artifact)?;
    step_done(predictor.artifact().model_name());

    step_run(&format!("Scoring {}", data.display()));
    let start = Instant::now();
    let summary = predictor.score_csv(data, output)?;
    step_done(&format!("{} rows in {:?}", summary.rows, start.elapsed()));

    print_batch_summary(&summary);
    step_ok(&format!("scored → {}", output.display()));
    println!();
    Ok(())
}

fn print_batch_summary(summary: &BatchSummary) {
    section("Summary");
    for line in summary.to_string().lines() {
        println!("  {}", line);
    }
}

pub fn cmd_info(artifact_path: &Path) -> anyhow::Result<()> {
    section("Artifact");

    let artifact = ArtifactSerializer::load(artifact_path)?;
    let schema = artifact.schema();

    kv_line("File", artifact_path.display());
    kv_line("Model", format!("{} ({})", artifact.model_name(), artifact.family()));
    kv_line("CV F1", format!("{:.4}", artifact.cv_f1()));
    kv_line("Trained at", artifact.trained_at().to_rfc3339());
    kv_line("Schema", format!("v{}", schema.version));
    kv_line("Ticket median", format!("{:.2}", schema.ticket_medio_median));

    section("Features");
    for (i, name) in schema.feature_names.iter().enumerate() {
        println!("  {:>3}  {}", dim(&i.to_string()), name);
    }
    println!();
    Ok(())
}

pub fn show_help() {
    println!();
    println!("  {}", "churnflow".truecolor(120, 170, 255).bold());
    println!("  {}", dim(&format!("churn pipeline  ·  v{}", env!("CARGO_PKG_VERSION"))));

    section("Commands");

    let cmds: &[(&str, &str)] = &[
        ("churnflow process -d raw.csv -o processed.csv", "Derive session features"),
        ("churnflow train -d raw.csv", "Select, evaluate and save a model"),
        ("churnflow train -c config.json --folds 10", "Train with a config file"),
        ("churnflow predict -a model.bin -f '{...}'", "Predict one feature row"),
        ("churnflow score -a model.bin -d in.csv -o out.csv", "Score a processed table"),
        ("churnflow info -a model.bin", "Inspect an artifact"),
    ];

    for (cmd, desc) in cmds {
        println!("  {:<52} {}", cmd.white(), muted(desc));
    }
    println!();
}
