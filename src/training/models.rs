//! Classifier trait and classification metrics

use crate::error::{ChurnError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shared capability of every candidate estimator
pub trait Classifier: Send + Sync {
    /// Fit the model to training data; labels must be 0 or 1
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()>;

    /// Probability of the positive (churn) class per row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Hard labels at a 0.5 threshold
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        Ok(self.predict_proba(x)?.mapv(|p| i64::from(p > 0.5)))
    }

    /// Get feature importances (if available)
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

/// Validate a training set before fitting
pub(crate) fn check_training_data(x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(ChurnError::InsufficientData(
            "cannot fit on an empty training set".to_string(),
        ));
    }
    if x.nrows() != y.len() {
        return Err(ChurnError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if let Some(bad) = y.iter().find(|&&l| l != 0 && l != 1) {
        return Err(ChurnError::ValidationError(format!(
            "binary classifier got label {}",
            bad
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ChurnError::ComputationError(
            "training features contain non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Validate prediction input width
pub(crate) fn check_prediction_width(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(ChurnError::ShapeError {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Normalize importances to sum to one; all-zero stays all-zero
pub(crate) fn normalize(mut values: Array1<f64>) -> Array1<f64> {
    let total = values.sum();
    if total > 0.0 {
        values /= total;
    }
    values
}

/// 2×2 confusion matrix; rows are true labels, columns predicted labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn compute(y_true: &Array1<i64>, y_pred: &Array1<i64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(ChurnError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        let mut counts = [[0usize; 2]; 2];
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            let (t, p) = (usize::from(t == 1), usize::from(p == 1));
            counts[t][p] += 1;
        }
        Ok(Self { counts })
    }

    pub fn true_negatives(&self) -> usize {
        self.counts[0][0]
    }

    pub fn false_positives(&self) -> usize {
        self.counts[0][1]
    }

    pub fn false_negatives(&self) -> usize {
        self.counts[1][0]
    }

    pub fn true_positives(&self) -> usize {
        self.counts[1][1]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives() + self.true_negatives(), self.total())
    }

    /// Precision, recall and F1 treating `class` as the positive label
    pub fn class_metrics(&self, class: usize) -> ClassMetrics {
        let other = 1 - class;
        let tp = self.counts[class][class];
        let fp = self.counts[other][class];
        let fn_ = self.counts[class][other];

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        ClassMetrics {
            precision,
            recall,
            f1,
            support: tp + fn_,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// F1 of the positive class (label 1); 0 when undefined
pub fn f1_score(y_true: &Array1<i64>, y_pred: &Array1<i64>) -> Result<f64> {
    Ok(ConfusionMatrix::compute(y_true, y_pred)?.class_metrics(1).f1)
}

/// Per-class precision/recall/F1 with support
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class breakdown plus accuracy and averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let classes = [cm.class_metrics(0), cm.class_metrics(1)];
        let total = cm.total();

        Self {
            classes,
            accuracy: cm.accuracy(),
            macro_avg: weighted_mean(&classes, [1.0, 1.0], total),
            weighted_avg: weighted_mean(
                &classes,
                [classes[0].support as f64, classes[1].support as f64],
                total,
            ),
        }
    }
}

fn weighted_mean(classes: &[ClassMetrics; 2], weights: [f64; 2], support: usize) -> ClassMetrics {
    let w_sum: f64 = weights.iter().sum();
    let mean = |f: fn(&ClassMetrics) -> f64| {
        if w_sum > 0.0 {
            classes.iter().zip(weights).map(|(c, w)| w * f(c)).sum::<f64>() / w_sum
        } else {
            0.0
        }
    };
    ClassMetrics {
        precision: mean(|c| c.precision),
        recall: mean(|c| c.recall),
        f1: mean(|c| c.f1),
        support,
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>14} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support")?;
        for (label, m) in self.classes.iter().enumerate() {
            writeln!(
                f,
                "{:>14} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.4} {:>10}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>14} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        Ok(())
    }
}
