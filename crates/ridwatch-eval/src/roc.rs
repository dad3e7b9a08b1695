//! ROC curves over (score, label) pairs.
//!
//! A score at or above the threshold is a positive. Candidate thresholds are
//! the unique scores, descending. AUC is trapezoidal through (0,0) and
//! (1,1). With no positives or no negatives the curve is undefined and AUC
//! is reported as 0.5.

use serde::{Deserialize, Serialize};

use ridwatch_core::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub tpr: f64,
    pub fpr: f64,
}

impl RocPoint {
    /// Youden's J.
    pub fn youden(&self) -> f64 {
        self.tpr - self.fpr
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    /// One point per unique score, thresholds descending.
    pub points: Vec<RocPoint>,
    pub auc: f64,
    pub positives: usize,
    pub negatives: usize,
}

impl RocCurve {
    pub fn compute(scores: &[f64], labels: &[bool]) -> EngineResult<Self> {
        if scores.len() != labels.len() {
            return Err(EngineError::config(format!(
                "{} scores but {} labels",
                scores.len(),
                labels.len()
            )));
        }

        let mut pairs: Vec<(f64, bool)> = scores
            .iter()
            .copied()
            .zip(labels.iter().copied())
            .filter(|(s, _)| !s.is_nan())
            .collect();
        if pairs.is_empty() {
            return Err(EngineError::NoScores("ROC curve".to_string()));
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let positives = pairs.iter().filter(|(_, l)| *l).count();
        let negatives = pairs.len() - positives;
        let rate = |count: usize, total: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };

        let mut points = Vec::new();
        let (mut tp, mut fp) = (0usize, 0usize);
        let mut i = 0;
        while i < pairs.len() {
            let threshold = pairs[i].0;
            while i < pairs.len() && pairs[i].0 == threshold {
                if pairs[i].1 {
                    tp += 1;
                } else {
                    fp += 1;
                }
                i += 1;
            }
            points.push(RocPoint {
                threshold,
                tpr: rate(tp, positives),
                fpr: rate(fp, negatives),
            });
        }

        let auc = if positives == 0 || negatives == 0 {
            0.5
        } else {
            trapezoid_auc(&points)
        };

        Ok(Self {
            points,
            auc,
            positives,
            negatives,
        })
    }

    /// Maximum Youden's J. Ties go to the lowest threshold.
    pub fn youden_optimal(&self) -> Option<RocPoint> {
        let mut best: Option<RocPoint> = None;
        for p in &self.points {
            if best.map_or(true, |b| p.youden() >= b.youden()) {
                best = Some(*p);
            }
        }
        best
    }

    /// Lowest threshold whose FPR stays at or below `target`.
    pub fn for_target_fpr(&self, target: f64) -> Option<RocPoint> {
        self.points.iter().rev().find(|p| p.fpr <= target).copied()
    }

    /// Highest threshold whose TPR reaches `target`.
    pub fn for_target_tpr(&self, target: f64) -> Option<RocPoint> {
        self.points.iter().find(|p| p.tpr >= target).copied()
    }
}

fn trapezoid_auc(points: &[RocPoint]) -> f64 {
    let mut area = 0.0;
    let (mut prev_fpr, mut prev_tpr) = (0.0, 0.0);
    for p in points.iter().map(|p| (p.fpr, p.tpr)).chain(std::iter::once((1.0, 1.0))) {
        area += (p.0 - prev_fpr) * (p.1 + prev_tpr) / 2.0;
        (prev_fpr, prev_tpr) = p;
    }
    area
}

/// AUC of `scores` against `labels`.
pub fn auc(scores: &[f64], labels: &[bool]) -> EngineResult<f64> {
    RocCurve::compute(scores, labels).map(|c| c.auc)
}
