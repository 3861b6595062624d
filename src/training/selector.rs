//! Cross-validated model selection

use crate::error::{ChurnError, Result};
use crate::feature_engineering::LabeledTable;
use crate::training::candidates::CandidateModel;
use crate::training::cross_validation::{CVSplit, StratifiedKFold};
use crate::training::models::{f1_score, Classifier};
use ndarray::Axis;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Mean cross-validated F1 of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub name: String,
    pub mean_f1: f64,
    pub fold_scores: Vec<f64>,
}

/// A candidate dropped because its own fit failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub name: String,
    pub reason: String,
}

/// Outcome of a selection run
#[derive(Debug, Clone)]
pub struct Selection {
    pub winner: CandidateModel,
    pub winner_f1: f64,
    /// Scores of every candidate that completed, in candidate order
    pub scores: Vec<ModelScore>,
    pub failures: Vec<CandidateFailure>,
}

/// Picks the candidate with the strictly highest mean stratified k-fold F1.
///
/// Folds are drawn once per run and shared by every candidate. The
/// candidate × fold grid runs on the rayon pool. Ties go to the candidate
/// listed first.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    n_folds: usize,
    seed: u64,
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self { n_folds: 5, seed: 42 }
    }
}

impl ModelSelector {
    pub fn new(n_folds: usize) -> Self {
        Self {
            n_folds,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn score_fold(candidate: &CandidateModel, train: &LabeledTable, split: &CVSplit) -> Result<f64> {
        let x_train = train.x().select(Axis(0), &split.train_indices);
        let y_train = train.y().select(Axis(0), &split.train_indices);
        let x_test = train.x().select(Axis(0), &split.test_indices);
        let y_test = train.y().select(Axis(0), &split.test_indices);

        let mut estimator = candidate.build();
        estimator.fit(&x_train, &y_train)?;
        let preds = estimator.predict(&x_test)?;
        let f1 = f1_score(&y_test, &preds)?;
        debug!(candidate = %candidate.name, fold = split.fold_idx, f1, "Scored fold");
        Ok(f1)
    }

    /// Run cross-validation over `candidates` and pick the winner
    pub fn select(&self, train: &LabeledTable, candidates: &[CandidateModel]) -> Result<Selection> {
        if candidates.is_empty() {
            return Err(ChurnError::ConfigError("no candidate models to select from".to_string()));
        }

        let splits = StratifiedKFold::new(self.n_folds)
            .with_random_state(self.seed)
            .split(train.y())?;

        let start = Instant::now();
        let grid: Vec<(usize, &CVSplit)> = (0..candidates.len())
            .flat_map(|c| splits.iter().map(move |s| (c, s)))
            .collect();
        let results: Vec<Result<f64>> = grid
            .par_iter()
            .map(|&(c, split)| Self::score_fold(&candidates[c], train, split))
            .collect();

        let (scores, failures) = tally(candidates, results, splits.len())?;

        let mut best: Option<&ModelScore> = None;
        for score in &scores {
            if best.map_or(true, |b| score.mean_f1 > b.mean_f1) {
                best = Some(score);
            }
        }
        let best = best.ok_or_else(|| {
            ChurnError::TrainingError("every candidate failed cross-validation".to_string())
        })?;

        let winner = candidates
            .iter()
            .find(|c| c.name == best.name)
            .cloned()
            .ok_or_else(|| ChurnError::TrainingError(format!("winner '{}' vanished", best.name)))?;

        info!(
            winner = %winner.name,
            f1 = best.mean_f1,
            folds = self.n_folds,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model selected"
        );

        Ok(Selection {
            winner_f1: best.mean_f1,
            winner,
            scores,
            failures,
        })
    }
}

/// Fold the flat candidate × fold results into per-candidate scores.
///
/// A candidate-local failure drops just that candidate. Anything else aborts.
fn tally(
    candidates: &[CandidateModel],
    results: Vec<Result<f64>>,
    n_folds: usize,
) -> Result<(Vec<ModelScore>, Vec<CandidateFailure>)> {
    let mut scores = Vec::new();
    let mut failures = Vec::new();
    let mut results = results.into_iter();

    for candidate in candidates {
        let mut fold_scores = Vec::with_capacity(n_folds);
        let mut failure = None;
        for result in results.by_ref().take(n_folds) {
            match result {
                Ok(f1) => fold_scores.push(f1),
                Err(e) if e.is_candidate_local() => {
                    if failure.is_none() {
                        failure = Some(e.to_string());
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(reason) = failure {
            warn!(candidate = %candidate.name, %reason, "Candidate excluded from selection");
            failures.push(CandidateFailure {
                name: candidate.name.clone(),
                reason,
            });
            continue;
        }

        let mean_f1 = fold_scores.iter().sum::<f64>() / fold_scores.len().max(1) as f64;
        info!(candidate = %candidate.name, mean_f1, "Cross-validated");
        scores.push(ModelScore {
            name: candidate.name.clone(),
            mean_f1,
            fold_scores,
        });
    }
    Ok((scores, failures))
}
