//! Labeled feature table

use crate::error::{ChurnError, Result};
use crate::feature_engineering::{FEATURE_NAMES, INTEGER_FEATURES, LABEL_COLUMN, N_FEATURES};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Feature matrix (rows × 12, [`FEATURE_NAMES`] order) plus binary churn labels
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable {
    x: Array2<f64>,
    y: Array1<i64>,
}

impl LabeledTable {
    /// Build a table, validating width, length and label alphabet
    pub fn new(x: Array2<f64>, y: Array1<i64>) -> Result<Self> {
        if x.ncols() != N_FEATURES {
            return Err(ChurnError::ShapeError {
                expected: format!("{} feature columns", N_FEATURES),
                actual: format!("{} columns", x.ncols()),
            });
        }
        if x.nrows() != y.len() {
            return Err(ChurnError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        if let Some(bad) = y.iter().find(|&&l| l != 0 && l != 1) {
            return Err(ChurnError::ValidationError(format!(
                "churn labels must be 0 or 1, found {}",
                bad
            )));
        }
        Ok(Self { x, y })
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<i64> {
        &self.y
    }

    pub fn into_parts(self) -> (Array2<f64>, Array1<i64>) {
        (self.x, self.y)
    }

    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Row count per label, ordered by label
    pub fn class_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for &label in self.y.iter() {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    /// Fraction of rows labeled churn
    pub fn churn_rate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.y.iter().filter(|&&l| l == 1).count() as f64 / self.n_rows() as f64
    }

    /// Sub-table with the given rows, in the given order
    pub fn select(&self, indices: &[usize]) -> LabeledTable {
        LabeledTable {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }

    /// The 13-column processed frame: features in schema order, then `churn`
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns: Vec<Column> = FEATURE_NAMES
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let col = self.x.column(j);
                if INTEGER_FEATURES[j] {
                    let values: Vec<i64> = col.iter().map(|v| v.round() as i64).collect();
                    Column::new((*name).into(), values)
                } else {
                    Column::new((*name).into(), col.to_vec())
                }
            })
            .collect();
        columns.push(Column::new(LABEL_COLUMN.into(), self.y.to_vec()));

        Ok(DataFrame::new(columns)?)
    }

    /// Write the processed frame as CSV
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
        Ok(())
    }

    /// Rebuild a table from a processed frame. Extra columns are ignored.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let missing: Vec<&str> = FEATURE_NAMES
            .iter()
            .copied()
            .chain(std::iter::once(LABEL_COLUMN))
            .filter(|name| df.get_column_index(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ChurnError::SchemaError(format!(
                "processed table is missing column(s): {}",
                missing.join(", ")
            )));
        }

        let x = feature_matrix(df, ChurnError::DataError)?;
        let labels = df
            .column(LABEL_COLUMN)?
            .as_materialized_series()
            .strict_cast(&DataType::Int64)
            .map_err(|_| ChurnError::DataError("churn label is not an integer column".to_string()))?;
        let y: Array1<i64> = labels
            .i64()?
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| ChurnError::DataError("null churn label".to_string()))
            })
            .collect::<Result<_>>()?;

        Self::new(x, y)
    }

    /// Load a processed table from CSV
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(1000))
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()?;
        Self::from_dataframe(&df)
    }
}

/// Extract the 12 feature columns of a frame, row-major.
///
/// Cells that do not parse as numbers and null cells are rejected through `reject`,
/// naming the column and, for nulls, the row.
pub(crate) fn feature_matrix(df: &DataFrame, reject: fn(String) -> ChurnError) -> Result<Array2<f64>> {
    let col_data: Vec<Vec<f64>> = FEATURE_NAMES
        .iter()
        .map(|name| {
            let series = df
                .column(name)
                .map_err(|_| ChurnError::SchemaError(format!("missing column '{}'", name)))?;
            let cast = series
                .as_materialized_series()
                .strict_cast(&DataType::Float64)
                .map_err(|_| {
                    reject(format!(
                        "column '{}' of type {} holds non-numeric values",
                        name,
                        series.dtype()
                    ))
                })?;
            cast.f64()?
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    v.ok_or_else(|| reject(format!("row {}: column '{}' is null", row, name)))
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<_>>()?;

    Ok(Array2::from_shape_fn((df.height(), N_FEATURES), |(r, c)| {
        col_data[c][r]
    }))
}
