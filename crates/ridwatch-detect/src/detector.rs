//! The detector capability and its output.

use serde::{Deserialize, Serialize};

use ridwatch_core::enums::{DetectorKind, Granularity};
use ridwatch_core::error::EngineResult;
use ridwatch_core::records::{DetectionRecord, ScoreTally, SkipReason};
use ridwatch_store::EventStore;

/// Scores one scenario at a time.
///
/// A detector owns its filter state. `score` starts from a clean state, so
/// one instance may score several scenarios in turn, but never two at once.
pub trait Detector: Send {
    fn kind(&self) -> DetectorKind;

    fn name(&self) -> String {
        self.kind().short_name().to_string()
    }

    fn granularity(&self) -> Granularity;

    /// Tunable parameters, for reports.
    fn params(&self) -> serde_json::Value;

    fn score(&mut self, store: &EventStore) -> EngineResult<ScoreSet>;
}

/// Scores of one detector on one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub detector: String,
    pub scenario_id: String,
    pub granularity: Granularity,
    pub records: Vec<DetectionRecord>,
    pub tally: ScoreTally,
}

impl ScoreSet {
    pub fn new(detector: impl Into<String>, scenario_id: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            detector: detector.into(),
            scenario_id: scenario_id.into(),
            granularity,
            records: Vec::new(),
            tally: ScoreTally::default(),
        }
    }

    pub fn push(&mut self, record: DetectionRecord) {
        self.tally.scored += 1;
        self.records.push(record);
    }

    pub fn skip(&mut self, reason: SkipReason) {
        self.tally.skip(reason);
    }

    pub fn scores(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.score).collect()
    }

    pub fn labels(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.label).collect()
    }
}

/// Per-item result of a detector that may decline to score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome<T> {
    Scored(T),
    Skipped(SkipReason),
}

impl<T> Outcome<T> {
    pub fn scored(self) -> Option<T> {
        match self {
            Outcome::Scored(v) => Some(v),
            Outcome::Skipped(_) => None,
        }
    }
}
