//! Session feature derivation

use crate::error::{ChurnError, Result};
use crate::feature_engineering::{FeatureVector, LabeledTable, RawSessionRecord, N_FEATURES};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Churn label: 1 when the session completed no transaction
pub fn churn_label(record: &RawSessionRecord) -> i64 {
    if record.transactions_or_zero() == 0 {
        1
    } else {
        0
    }
}

/// Median with the midpoint convention for even lengths; 0 for an empty slice
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn ticket_medio(record: &RawSessionRecord) -> f64 {
    record.revenue_or_zero() / (record.transactions_or_zero() as f64 + 1.0)
}

fn flag(cond: bool) -> u8 {
    u8::from(cond)
}

/// Derives [`FeatureVector`]s from raw sessions.
///
/// `cliente_ticket_alto` compares against the median `ticket_medio` of the
/// batch seen by [`fit`](Self::fit). The median is frozen there, so later
/// batches (including single records at serving time) reuse it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFeatureTransformer {
    ticket_median: Option<f64>,
}

impl SessionFeatureTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transformer with an already frozen median
    pub fn with_ticket_median(median: f64) -> Self {
        Self {
            ticket_median: Some(median),
        }
    }

    pub fn ticket_median(&self) -> Option<f64> {
        self.ticket_median
    }

    pub fn is_fitted(&self) -> bool {
        self.ticket_median.is_some()
    }

    /// Compute and freeze the batch median of `ticket_medio`
    pub fn fit(&mut self, records: &[RawSessionRecord]) -> &mut Self {
        let tickets: Vec<f64> = records.iter().map(ticket_medio).collect();
        let m = median(&tickets);
        debug!(rows = records.len(), ticket_median = m, "Froze ticket_medio median");
        self.ticket_median = Some(m);
        self
    }

    /// Features of a single record against the frozen median
    pub fn features(&self, record: &RawSessionRecord) -> Result<FeatureVector> {
        let threshold = self.ticket_median.ok_or(ChurnError::ModelNotFitted)?;

        let pageviews = record.pageviews_or_zero();
        let time_on_site = record.time_on_site_or_zero();
        let tempo_por_pagina = time_on_site / (pageviews as f64 + 1.0);
        let ticket = ticket_medio(record);
        let device = record.device.as_deref();
        let medium = record.traffic_medium.as_deref();

        Ok(FeatureVector {
            pageviews,
            time_on_site,
            tempo_por_pagina,
            ticket_medio: ticket,
            engajamento_baixo: flag(pageviews <= 2),
            visitante_rapido: flag(tempo_por_pagina <= 5.0),
            cliente_ticket_alto: flag(ticket > threshold),
            device_mobile: flag(device == Some("mobile")),
            device_tablet: flag(device == Some("tablet")),
            device_desktop: flag(device == Some("desktop")),
            via_organica: flag(medium == Some("organic")),
            via_pago: flag(medium == Some("cpc")),
        })
    }

    /// Build the labeled table for a batch using the frozen median
    pub fn transform(&self, records: &[RawSessionRecord]) -> Result<LabeledTable> {
        let mut x = Array2::<f64>::zeros((records.len(), N_FEATURES));
        let mut y = Array1::<i64>::zeros(records.len());

        for (i, record) in records.iter().enumerate() {
            let values = self.features(record)?.to_array();
            for (j, v) in values.iter().enumerate() {
                x[[i, j]] = *v;
            }
            y[i] = churn_label(record);
        }

        LabeledTable::new(x, y)
    }

    /// Fit on the batch, then transform it
    pub fn fit_transform(&mut self, records: &[RawSessionRecord]) -> Result<LabeledTable> {
        self.fit(records);
        self.transform(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pv: Option<i64>, tos: Option<f64>, tx: Option<i64>, rev: Option<f64>) -> RawSessionRecord {
        RawSessionRecord {
            device: Some("mobile".to_string()),
            traffic_medium: Some("organic".to_string()),
            pageviews: pv,
            time_on_site: tos,
            transactions: tx,
            transaction_revenue: rev,
            ..Default::default()
        }
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_null_fields_read_as_zero() {
        let mut t = SessionFeatureTransformer::new();
        let records = vec![record(None, None, None, None)];
        let table = t.fit_transform(&records).unwrap();
        let row = table.x().row(0);
        assert_eq!(row[0], 0.0);
        assert_eq!(row[1], 0.0);
        assert_eq!(row[2], 0.0);
        assert_eq!(row[3], 0.0);
        assert_eq!(row[4], 1.0);
        assert_eq!(row[5], 1.0);
        assert_eq!(row[6], 0.0);
        assert_eq!(table.y()[0], 1);
    }

    #[test]
    fn test_ticket_flag_uses_frozen_median() {
        let records = vec![
            record(Some(3), Some(30.0), Some(1), Some(100.0)),
            record(Some(3), Some(30.0), Some(1), Some(300.0)),
            record(Some(3), Some(30.0), Some(1), Some(500.0)),
        ];
        let mut t = SessionFeatureTransformer::new();
        let table = t.fit_transform(&records).unwrap();
        assert_eq!(t.ticket_median(), Some(150.0));
        assert_eq!(table.x().column(6).to_vec(), vec![0.0, 0.0, 1.0]);

        // A single record keeps using the training median
        let single = t.transform(&records[1..2]).unwrap();
        assert_eq!(single.x()[[0, 6]], 0.0);
        let single = t.transform(&records[2..3]).unwrap();
        assert_eq!(single.x()[[0, 6]], 1.0);
    }

    #[test]
    fn test_unknown_device_yields_no_flag() {
        let mut r = record(Some(4), Some(10.0), Some(0), None);
        r.device = Some("smart-tv".to_string());
        r.traffic_medium = Some("cpc".to_string());
        let t = SessionFeatureTransformer::with_ticket_median(0.0);
        let v = t.features(&r).unwrap();
        assert_eq!((v.device_mobile, v.device_tablet, v.device_desktop), (0, 0, 0));
        assert_eq!((v.via_organica, v.via_pago), (0, 1));
    }

    #[test]
    fn test_transform_requires_fit() {
        let t = SessionFeatureTransformer::new();
        let err = t.transform(&[record(Some(1), None, None, None)]).unwrap_err();
        assert!(matches!(err, ChurnError::ModelNotFitted));
    }
}
