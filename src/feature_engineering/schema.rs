//! The feature schema shared by training, artifacts and serving

use crate::error::{ChurnError, Result};
use serde::{Deserialize, Serialize};

/// Number of model features
pub const N_FEATURES: usize = 12;

/// Feature names in the exact column order models are trained on
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "pageviews",
    "timeOnSite",
    "tempo_por_pagina",
    "ticket_medio",
    "engajamento_baixo",
    "visitante_rapido",
    "cliente_ticket_alto",
    "device_mobile",
    "device_tablet",
    "device_desktop",
    "via_organica",
    "via_pago",
];

/// Name of the label column in processed tables
pub const LABEL_COLUMN: &str = "churn";

/// Per-column flag: true where the feature is integer typed.
/// Every integer feature except `pageviews` is a 0/1 flag.
pub const INTEGER_FEATURES: [bool; N_FEATURES] = [
    true, false, false, false, true, true, true, true, true, true, true, true,
];

/// One engineered feature row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureVector {
    pub pageviews: i64,
    #[serde(rename = "timeOnSite")]
    pub time_on_site: f64,
    pub tempo_por_pagina: f64,
    pub ticket_medio: f64,
    pub engajamento_baixo: u8,
    pub visitante_rapido: u8,
    pub cliente_ticket_alto: u8,
    pub device_mobile: u8,
    pub device_tablet: u8,
    pub device_desktop: u8,
    pub via_organica: u8,
    pub via_pago: u8,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order
    pub fn to_array(&self) -> [f64; N_FEATURES] {
        [
            self.pageviews as f64,
            self.time_on_site,
            self.tempo_por_pagina,
            self.ticket_medio,
            self.engajamento_baixo as f64,
            self.visitante_rapido as f64,
            self.cliente_ticket_alto as f64,
            self.device_mobile as f64,
            self.device_tablet as f64,
            self.device_desktop as f64,
            self.via_organica as f64,
            self.via_pago as f64,
        ]
    }

    /// Rebuild a vector from values in [`FEATURE_NAMES`] order, checking types.
    pub fn from_values(values: &[f64]) -> Result<Self> {
        if values.len() != N_FEATURES {
            return Err(ChurnError::InferenceSchemaMismatch(format!(
                "expected {} features, got {}",
                N_FEATURES,
                values.len()
            )));
        }

        for (idx, &v) in values.iter().enumerate() {
            check_value(idx, v)?;
        }

        let flag = |i: usize| values[i] as u8;
        Ok(Self {
            pageviews: values[0] as i64,
            time_on_site: values[1],
            tempo_por_pagina: values[2],
            ticket_medio: values[3],
            engajamento_baixo: flag(4),
            visitante_rapido: flag(5),
            cliente_ticket_alto: flag(6),
            device_mobile: flag(7),
            device_tablet: flag(8),
            device_desktop: flag(9),
            via_organica: flag(10),
            via_pago: flag(11),
        })
    }
}

fn check_value(idx: usize, v: f64) -> Result<()> {
    let name = FEATURE_NAMES[idx];
    if !v.is_finite() {
        return Err(ChurnError::InferenceSchemaMismatch(format!(
            "feature '{}' is not a finite number",
            name
        )));
    }
    if INTEGER_FEATURES[idx] && v.fract() != 0.0 {
        return Err(ChurnError::InferenceSchemaMismatch(format!(
            "feature '{}' must be an integer, got {}",
            name, v
        )));
    }
    if idx >= 4 && v != 0.0 && v != 1.0 {
        return Err(ChurnError::InferenceSchemaMismatch(format!(
            "flag '{}' must be 0 or 1, got {}",
            name, v
        )));
    }
    if idx == 0 && v < 0.0 {
        return Err(ChurnError::InferenceSchemaMismatch(format!(
            "feature 'pageviews' must be non-negative, got {}",
            v
        )));
    }
    Ok(())
}
