//! Feature engineering module
//!
//! Turns raw session telemetry into the fixed 12-field feature schema:
//! - [`RawSessionRecord`] parsing from the upstream tabular export
//! - [`SessionFeatureTransformer`] with a frozen batch median for `cliente_ticket_alto`
//! - [`LabeledTable`] holding the feature matrix and the churn label

mod schema;
mod session;
mod table;
mod transformer;

pub use schema::{FeatureVector, FEATURE_NAMES, INTEGER_FEATURES, LABEL_COLUMN, N_FEATURES};
pub use session::{RawSessionRecord, REQUIRED_RAW_COLUMNS};
pub use table::LabeledTable;
pub(crate) use table::feature_matrix;
pub use transformer::{churn_label, median, SessionFeatureTransformer};
