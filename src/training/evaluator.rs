//! Final held-out evaluation of the selected model

use crate::error::{ChurnError, Result};
use crate::feature_engineering::{LabeledTable, FEATURE_NAMES};
use crate::training::candidates::{CandidateModel, Estimator};
use crate::training::models::{ClassificationReport, Classifier, ConfusionMatrix};
use ndarray::Array1;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File name of the importance chart inside the figures directory
pub const IMPORTANCE_CHART_FILE: &str = "feature_importance.svg";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Held-out metrics of the fitted winner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_name: String,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
    /// F1 of the churn class on the test partition
    pub f1: f64,
    /// Ranked descending; `None` when the estimator exposes no importances
    pub importances: Option<Vec<FeatureImportance>>,
    pub chart_path: Option<PathBuf>,
    pub test_predictions: Array1<i64>,
}

impl EvaluationReport {
    pub fn top_importances(&self, n: usize) -> &[FeatureImportance] {
        match &self.importances {
            Some(ranked) => &ranked[..n.min(ranked.len())],
            None => &[],
        }
    }
}

/// Fits the winner on the full train partition and scores it on the test partition.
///
/// Nothing here feeds back into selection.
#[derive(Debug, Clone, Default)]
pub struct FinalEvaluator {
    figures_dir: Option<PathBuf>,
}

impl FinalEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_figures_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.figures_dir = Some(dir.into());
        self
    }

    pub fn evaluate(
        &self,
        winner: &CandidateModel,
        train: &LabeledTable,
        test: &LabeledTable,
    ) -> Result<(Estimator, EvaluationReport)> {
        if test.is_empty() {
            return Err(ChurnError::InsufficientData("test partition is empty".to_string()));
        }

        let mut estimator = winner.build();
        estimator.fit(train.x(), train.y())?;
        let predictions = estimator.predict(test.x())?;

        let confusion = ConfusionMatrix::compute(test.y(), &predictions)?;
        let report = ClassificationReport::from_confusion(&confusion);
        let f1 = report.classes[1].f1;
        let importances = estimator.feature_importances().map(|scores| rank_importances(&scores));

        info!(
            model = %winner.name,
            test_rows = test.n_rows(),
            accuracy = report.accuracy,
            f1,
            "Final evaluation"
        );

        let chart_path = match (&self.figures_dir, &importances) {
            (Some(dir), Some(ranked)) => {
                let path = dir.join(IMPORTANCE_CHART_FILE);
                match write_importance_chart(ranked, &path) {
                    Ok(()) => {
                        info!(path = %path.display(), "Wrote feature importance chart");
                        Some(path)
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Could not write feature importance chart");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok((
            estimator,
            EvaluationReport {
                model_name: winner.name.clone(),
                confusion,
                report,
                f1,
                importances,
                chart_path,
                test_predictions: predictions,
            },
        ))
    }
}

/// Pair scores with feature names, highest first. Equal scores keep schema order.
pub fn rank_importances(scores: &Array1<f64>) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = FEATURE_NAMES
        .iter()
        .zip(scores.iter())
        .map(|(name, &importance)| FeatureImportance {
            feature: name.to_string(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

fn chart_error(e: impl std::fmt::Display) -> ChurnError {
    ChurnError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

/// Horizontal bar chart of ranked importances, largest bar on top
pub fn write_importance_chart(ranked: &[FeatureImportance], path: &Path) -> Result<()> {
    if ranked.is_empty() {
        return Err(ChurnError::ValidationError("no importances to plot".to_string()));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let n = ranked.len();
    let x_max = ranked
        .iter()
        .map(|f| f.importance)
        .fold(0.0_f64, f64::max)
        .max(1e-9)
        * 1.1;
    let height = 80 + 28 * n as u32;

    let root = SVGBackend::new(path, (800, height)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature importance", ("sans-serif", 20))
        .margin(15)
        .x_label_area_size(35)
        .y_label_area_size(170)
        .build_cartesian_2d(0f64..x_max, (0..n as i32).into_segmented())
        .map_err(chart_error)?;

    // Bar i sits at row n-1-i
    let label = |v: &SegmentValue<i32>| match v {
        SegmentValue::CenterOf(row) => ranked
            .get(n - 1 - (*row).clamp(0, n as i32 - 1) as usize)
            .map(|f| f.feature.clone())
            .unwrap_or_default(),
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n)
        .y_label_formatter(&label)
        .x_desc("importance")
        .draw()
        .map_err(chart_error)?;

    chart
        .draw_series(ranked.iter().enumerate().map(|(i, f)| {
            let row = (n - 1 - i) as i32;
            let mut bar = Rectangle::new(
                [(0.0, SegmentValue::Exact(row)), (f.importance, SegmentValue::Exact(row + 1))],
                RGBColor(31, 119, 180).filled(),
            );
            bar.set_margin(3, 3, 0, 0);
            bar
        }))
        .map_err(chart_error)?;

    root.present().map_err(chart_error)?;
    Ok(())
}
