//! Inference module
//!
//! Serving-side use of a trained artifact:
//! - Single-request prediction with schema checks ([`ChurnPredictor`])
//! - JSON request/reply handling for the serving boundary
//! - Batch scoring of processed tables with a summary report

mod batch;
mod predictor;

pub use batch::{BatchSummary, GroupMeans, PREDICTION_COLUMN};
pub use predictor::{ChurnPredictor, PredictionReply, CHURN_MESSAGE, STAY_MESSAGE};
