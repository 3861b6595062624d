//! Raw session records as exported by the analytics warehouse

use crate::error::{ChurnError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Columns a raw batch must carry for the features to be derivable.
/// Identifier and geo columns are read when present.
pub const REQUIRED_RAW_COLUMNS: [&str; 6] = [
    "device",
    "traffic_medium",
    "pageviews",
    "timeOnSite",
    "transactions",
    "transactionRevenue",
];

/// One customer visit. Numeric fields stay `None` when the export had no value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSessionRecord {
    #[serde(rename = "fullVisitorId")]
    pub full_visitor_id: Option<String>,
    #[serde(rename = "visitId")]
    pub visit_id: Option<String>,
    pub date: Option<String>,
    pub device: Option<String>,
    pub os: Option<String>,
    pub country: Option<String>,
    pub traffic_medium: Option<String>,
    pub traffic_source: Option<String>,
    pub pageviews: Option<i64>,
    #[serde(rename = "timeOnSite")]
    pub time_on_site: Option<f64>,
    pub transactions: Option<i64>,
    #[serde(rename = "transactionRevenue")]
    pub transaction_revenue: Option<f64>,
}

impl RawSessionRecord {
    /// Page views with absent values read as zero
    pub fn pageviews_or_zero(&self) -> i64 {
        self.pageviews.unwrap_or(0)
    }

    pub fn time_on_site_or_zero(&self) -> f64 {
        self.time_on_site.unwrap_or(0.0)
    }

    pub fn transactions_or_zero(&self) -> i64 {
        self.transactions.unwrap_or(0)
    }

    pub fn revenue_or_zero(&self) -> f64 {
        self.transaction_revenue.unwrap_or(0.0)
    }

    /// Parse every row of a raw export frame.
    ///
    /// Fails with [`ChurnError::SchemaError`] when a required column is absent
    /// from the frame; a null in a present column is fine.
    pub fn from_frame(df: &DataFrame) -> Result<Vec<Self>> {
        let missing: Vec<&str> = REQUIRED_RAW_COLUMNS
            .iter()
            .copied()
            .filter(|name| df.get_column_index(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ChurnError::SchemaError(format!(
                "raw session batch is missing required column(s): {}",
                missing.join(", ")
            )));
        }

        let n = df.height();
        let visitor = optional_text(df, "fullVisitorId", n)?;
        let visit = optional_text(df, "visitId", n)?;
        let date = optional_text(df, "date", n)?;
        let device = optional_text(df, "device", n)?;
        let os = optional_text(df, "os", n)?;
        let country = optional_text(df, "country", n)?;
        let medium = optional_text(df, "traffic_medium", n)?;
        let source = optional_text(df, "traffic_source", n)?;
        let pageviews = count_column(df, "pageviews")?;
        let time_on_site = amount_column(df, "timeOnSite")?;
        let transactions = count_column(df, "transactions")?;
        let revenue = amount_column(df, "transactionRevenue")?;

        let records = (0..n)
            .map(|i| RawSessionRecord {
                full_visitor_id: visitor[i].clone(),
                visit_id: visit[i].clone(),
                date: date[i].clone(),
                device: device[i].clone(),
                os: os[i].clone(),
                country: country[i].clone(),
                traffic_medium: medium[i].clone(),
                traffic_source: source[i].clone(),
                pageviews: pageviews[i],
                time_on_site: time_on_site[i],
                transactions: transactions[i],
                transaction_revenue: revenue[i],
            })
            .collect();

        Ok(records)
    }

    /// Load a raw export from a CSV file
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Vec<Self>> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(10_000))
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()?;
        Self::from_frame(&df)
    }
}

fn optional_text(df: &DataFrame, name: &str, n: usize) -> Result<Vec<Option<String>>> {
    let Ok(column) = df.column(name) else {
        return Ok(vec![None; n]);
    };
    let cast = column.cast(&DataType::String)?;
    let values = cast
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect();
    Ok(values)
}

fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| ChurnError::SchemaError(format!("missing column '{}'", name)))?;
    let cast = column.cast(&DataType::Float64)?;
    let values: Vec<Option<f64>> = cast.f64()?.into_iter().collect();

    if let Some(bad) = values.iter().flatten().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(ChurnError::DataError(format!(
            "column '{}' holds {}, expected a non-negative number",
            name, bad
        )));
    }
    Ok(values)
}

fn amount_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    float_values(df, name)
}

/// Integer counts; fractional values truncate toward zero
fn count_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    Ok(float_values(df, name)?
        .into_iter()
        .map(|v| v.map(|x| x.trunc() as i64))
        .collect())
}
