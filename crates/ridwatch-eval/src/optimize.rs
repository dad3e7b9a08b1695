//! Threshold selection and the path-loss exponent line search.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ridwatch_core::error::{EngineError, EngineResult};
use ridwatch_core::records::DetectionRecord;
use ridwatch_detect::ScoreSet;
use ridwatch_store::EventStore;

use crate::metrics::{spoof_onsets, Confusion, DetectionMetrics, SpoofOnsets, TimeToDetection};
use crate::roc::RocCurve;

/// An operating threshold chosen on training data and reused verbatim at
/// test time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    /// Training statistics; `None` for a supplied threshold.
    pub tpr: Option<f64>,
    pub fpr: Option<f64>,
    pub auc: Option<f64>,
}

impl Threshold {
    /// A supplied threshold with no training statistics.
    pub fn fixed(value: f64) -> Self {
        Self {
            value,
            tpr: None,
            fpr: None,
            auc: None,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.auc.is_some()
    }
}

/// How the operating point is picked from a training ROC curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "criterion", content = "target")]
pub enum OperatingPoint {
    /// Maximize TPR − FPR.
    #[default]
    Youden,
    /// Highest recall with FPR at or below the target.
    TargetFpr(f64),
    /// Highest threshold with TPR at or above the target.
    TargetTpr(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThresholdOptimizer {
    pub criterion: OperatingPoint,
}

impl ThresholdOptimizer {
    pub fn new(criterion: OperatingPoint) -> Self {
        Self { criterion }
    }

    pub fn fit(&self, scores: &[f64], labels: &[bool]) -> EngineResult<(Threshold, RocCurve)> {
        let curve = RocCurve::compute(scores, labels)?;
        let point = match self.criterion {
            OperatingPoint::Youden => curve.youden_optimal(),
            OperatingPoint::TargetFpr(target) => curve.for_target_fpr(target),
            OperatingPoint::TargetTpr(target) => curve.for_target_tpr(target),
        }
        .ok_or_else(|| {
            EngineError::NoScores(format!("operating point {:?}", self.criterion))
        })?;

        let threshold = Threshold {
            value: point.threshold,
            tpr: Some(point.tpr),
            fpr: Some(point.fpr),
            auc: Some(curve.auc),
        };
        debug!(?threshold, candidates = curve.points.len(), "threshold selected");
        Ok((threshold, curve))
    }

    /// Fit on every record of a split.
    pub fn fit_sets(&self, sets: &[ScoreSet]) -> EngineResult<(Threshold, RocCurve)> {
        let (scores, labels) = flatten(sets);
        self.fit(&scores, &labels)
    }

    /// Metrics of a split at a fixed threshold. `stores` supplies spoof
    /// onsets for time-to-detection, matched to sets by scenario id.
    pub fn evaluate(threshold: f64, sets: &[ScoreSet], stores: &[EventStore]) -> EngineResult<DetectionMetrics> {
        let (scores, labels) = flatten(sets);
        let curve = RocCurve::compute(&scores, &labels)?;
        let records = || sets.iter().flat_map(|s| s.records.iter());
        let confusion = Confusion::at_threshold(records(), threshold);

        let onsets: Vec<SpoofOnsets> = sets
            .iter()
            .map(|set| {
                stores
                    .iter()
                    .find(|store| store.scenario_id() == set.scenario_id)
                    .map(spoof_onsets)
                    .unwrap_or_default()
            })
            .collect();
        let ttd = TimeToDetection::compute(
            sets.iter().zip(&onsets).map(|(s, o)| (s.records.as_slice(), o)),
            threshold,
        );
        Ok(DetectionMetrics {
            threshold,
            auc: curve.auc,
            tpr: confusion.tpr(),
            fpr: confusion.fpr(),
            accuracy: confusion.accuracy(),
            confusion,
            time_to_detection: ttd,
            n_records: scores.len(),
            n_spoofed: curve.positives,
        })
    }
}

/// Scores and labels of every record, in set order.
pub fn flatten(sets: &[ScoreSet]) -> (Vec<f64>, Vec<bool>) {
    sets.iter()
        .flat_map(|s| s.records.iter())
        .map(|r: &DetectionRecord| (r.score, r.label))
        .unzip()
}

/// AUC of one candidate path-loss exponent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateAuc {
    pub exponent: f64,
    pub auc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathLossSearch {
    pub candidates: Vec<CandidateAuc>,
    pub best: CandidateAuc,
}

/// Evaluate `auc_for` at each candidate and keep the best. Ties keep the
/// earlier candidate.
pub fn search_path_loss<F>(candidates: &[f64], mut auc_for: F) -> EngineResult<PathLossSearch>
where
    F: FnMut(f64) -> EngineResult<f64>,
{
    let mut results = Vec::with_capacity(candidates.len());
    let mut best: Option<CandidateAuc> = None;
    for &exponent in candidates {
        let auc = auc_for(exponent)?;
        info!(exponent, auc, "path-loss candidate");
        let candidate = CandidateAuc { exponent, auc };
        if best.map_or(true, |b| auc > b.auc) {
            best = Some(candidate);
        }
        results.push(candidate);
    }
    let best = best.ok_or_else(|| EngineError::config("path_loss_candidates is empty"))?;
    info!(exponent = best.exponent, auc = best.auc, "path-loss exponent selected");
    Ok(PathLossSearch {
        candidates: results,
        best,
    })
}
