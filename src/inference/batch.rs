//! Batch scoring of processed tables

use crate::error::{ChurnError, Result};
use crate::feature_engineering::{feature_matrix, FeatureVector, FEATURE_NAMES};
use crate::inference::ChurnPredictor;
use ndarray::{Array2, ArrayView1};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Column appended by [`ChurnPredictor::score_frame`]
pub const PREDICTION_COLUMN: &str = "churn_prediction";

/// Feature means of one predicted group; `None` when the group is empty
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupMeans {
    pub rows: usize,
    pub time_on_site: Option<f64>,
    pub pageviews: Option<f64>,
    pub ticket_medio: Option<f64>,
}

impl GroupMeans {
    fn of(x: &Array2<f64>, members: &[usize]) -> Self {
        let mean = |col: usize| {
            if members.is_empty() {
                None
            } else {
                Some(members.iter().map(|&r| x[[r, col]]).sum::<f64>() / members.len() as f64)
            }
        };
        Self {
            rows: members.len(),
            pageviews: mean(0),
            time_on_site: mean(1),
            ticket_medio: mean(3),
        }
    }
}

/// Shape of a scored batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub rows: usize,
    pub churn_pct: f64,
    pub stay_pct: f64,
    pub stay: GroupMeans,
    pub churn: GroupMeans,
}

impl BatchSummary {
    pub fn from_predictions(x: &Array2<f64>, predictions: &[u8]) -> Self {
        let (churned, stayed): (Vec<usize>, Vec<usize>) =
            (0..predictions.len()).partition(|&i| predictions[i] == 1);
        let rows = predictions.len();
        let pct = |n: usize| if rows == 0 { 0.0 } else { 100.0 * n as f64 / rows as f64 };

        Self {
            rows,
            churn_pct: pct(churned.len()),
            stay_pct: pct(stayed.len()),
            stay: GroupMeans::of(x, &stayed),
            churn: GroupMeans::of(x, &churned),
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v));
        writeln!(f, "rows: {}  churn: {:.1}%  stay: {:.1}%", self.rows, self.churn_pct, self.stay_pct)?;
        writeln!(f, "{:<8} {:>6} {:>12} {:>10} {:>13}", "group", "rows", "timeOnSite", "pageviews", "ticket_medio")?;
        for (name, g) in [("stay", &self.stay), ("churn", &self.churn)] {
            writeln!(
                f,
                "{:<8} {:>6} {:>12} {:>10} {:>13}",
                name,
                g.rows,
                cell(g.time_on_site),
                cell(g.pageviews),
                cell(g.ticket_medio)
            )?;
        }
        Ok(())
    }
}

fn check_row(row: ArrayView1<f64>) -> Result<()> {
    FeatureVector::from_values(&row.to_vec()).map(|_| ())
}

impl ChurnPredictor {
    /// Score a processed frame. Extra columns are carried through.
    pub fn score_frame(&self, mut df: DataFrame) -> Result<(DataFrame, BatchSummary)> {
        let missing: Vec<&str> = FEATURE_NAMES
            .iter()
            .copied()
            .filter(|name| df.get_column_index(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ChurnError::InferenceSchemaMismatch(format!(
                "batch is missing features: {}",
                missing.join(", ")
            )));
        }

        let x = feature_matrix(&df, ChurnError::InferenceSchemaMismatch)?;
        for (i, row) in x.rows().into_iter().enumerate() {
            check_row(row).map_err(|e| match e {
                ChurnError::InferenceSchemaMismatch(msg) => {
                    ChurnError::InferenceSchemaMismatch(format!("row {}: {}", i, msg))
                }
                other => other,
            })?;
        }

        let predictions = if x.nrows() == 0 { Vec::new() } else { self.predict_matrix(&x)? };
        let summary = BatchSummary::from_predictions(&x, &predictions);

        let labels: Vec<i64> = predictions.iter().map(|&p| i64::from(p)).collect();
        df.with_column(Column::new(PREDICTION_COLUMN.into(), labels))?;

        info!(rows = summary.rows, churn_pct = summary.churn_pct, "Scored batch");
        Ok((df, summary))
    }

    /// Score a processed CSV and write it back out with predictions appended
    pub fn score_csv(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<BatchSummary> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .try_into_reader_with_file_path(Some(input.as_ref().to_path_buf()))?
            .finish()?;

        let (mut scored, summary) = self.score_frame(df)?;

        let output = output.as_ref();
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(output)?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut scored)?;
        info!(path = %output.display(), "Wrote scored batch");
        Ok(summary)
    }
}
