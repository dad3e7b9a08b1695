//! Detector output: scored records and the tally of what was not scored.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{TransmissionKey, TransmitterId};

/// What a detection score refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKey {
    /// Index of a reception event in its scenario's event store.
    Event(usize),
    Transmission(TransmissionKey),
}

/// One score produced by a detector. Higher means more likely spoofed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub key: RecordKey,
    pub transmitter: TransmitterId,
    pub score: f64,
    /// Ground truth.
    pub label: bool,
    /// Time of the scored observation (seconds).
    pub time: f64,
}

/// Why an input row never became a reception event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// A required field was empty.
    MissingField,
    /// A field failed to parse as a number, flag, or event type.
    InvalidField,
    /// NaN/Inf in time, geometry, or RSSI.
    NonFiniteValue,
    /// The CSV reader rejected the row (e.g. wrong field count).
    UnreadableRow,
}

/// Why a detector produced no score for an otherwise valid input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// First observation of a filter; nothing to compare against yet.
    Bootstrap,
    /// Non-finite distance or RSSI at scoring time.
    NonFinite,
    /// Transmission not heard by every federate.
    InsufficientObservations,
    /// Federate receivers are collinear or coincident.
    DegenerateGeometry,
    /// Least-squares solve failed or landed outside plausible bounds.
    NonConvergence,
    /// No external score exists for this transmission.
    MissingExternalScore,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Bootstrap => "bootstrap",
            SkipReason::NonFinite => "non-finite input",
            SkipReason::InsufficientObservations => "insufficient observations",
            SkipReason::DegenerateGeometry => "degenerate geometry",
            SkipReason::NonConvergence => "non-convergence",
            SkipReason::MissingExternalScore => "missing external score",
        };
        f.write_str(s)
    }
}

/// Counts of scored and unscored items for one detector run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTally {
    pub scored: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl ScoreTally {
    pub fn skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_insert(0) += 1;
    }

    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &ScoreTally) {
        self.scored += other.scored;
        for (reason, count) in &other.skipped {
            *self.skipped.entry(*reason).or_insert(0) += count;
        }
    }
}
