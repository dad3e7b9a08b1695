//! Scores computed outside the engine, e.g. by a learned classifier.
//!
//! The score file is a CSV with `filename, serial_number, rid_timestamp,
//! y_proba` and an optional `is_spoofed`. Scenarios are matched by file
//! stem, so `runs/a.csv` and `a.csv` name the same scenario.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use ridwatch_core::enums::{DetectorKind, Granularity};
use ridwatch_core::error::{EngineError, EngineResult};
use ridwatch_core::records::{DetectionRecord, RecordKey, SkipReason};
use ridwatch_core::types::TransmissionKey;
use ridwatch_store::EventStore;

use crate::detector::{Detector, ScoreSet};

#[derive(Debug, Deserialize)]
struct ScoreRow {
    filename: String,
    serial_number: u32,
    rid_timestamp: i64,
    y_proba: f64,
    #[serde(default)]
    is_spoofed: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExternalScore {
    pub score: f64,
    pub label: Option<bool>,
}

/// External scores indexed by scenario stem and transmission.
#[derive(Debug, Clone, Default)]
pub struct ExternalScores {
    scores: HashMap<String, HashMap<TransmissionKey, ExternalScore>>,
}

impl ExternalScores {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let file = File::open(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, path)
    }

    pub fn from_reader<R: io::Read>(reader: R, source: &Path) -> EngineResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut out = Self::default();
        for row in rdr.deserialize::<ScoreRow>() {
            let row = row.map_err(|e| EngineError::Csv {
                path: source.to_path_buf(),
                message: e.to_string(),
            })?;
            if !row.y_proba.is_finite() {
                continue;
            }
            out.insert(
                &row.filename,
                TransmissionKey::new(row.serial_number, row.rid_timestamp),
                ExternalScore {
                    score: row.y_proba,
                    label: row.is_spoofed.as_deref().and_then(parse_label),
                },
            );
        }
        debug!(source = %source.display(), scenarios = out.scores.len(), rows = out.len(), "loaded external scores");
        Ok(out)
    }

    pub fn insert(&mut self, scenario: &str, key: TransmissionKey, score: ExternalScore) {
        self.scores
            .entry(scenario_stem(scenario))
            .or_default()
            .insert(key, score);
    }

    pub fn get(&self, scenario: &str, key: TransmissionKey) -> Option<ExternalScore> {
        self.scores
            .get(&scenario_stem(scenario))
            .and_then(|s| s.get(&key))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.scores.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_label(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Some(true),
        "0" | "0.0" | "false" => Some(false),
        _ => None,
    }
}

fn scenario_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_string()
}

/// Exposes [`ExternalScores`] as a transmission-level detector.
#[derive(Debug, Clone)]
pub struct ExternalScoreDetector {
    scores: Arc<ExternalScores>,
}

impl ExternalScoreDetector {
    pub fn new(scores: Arc<ExternalScores>) -> Self {
        Self { scores }
    }
}

impl Detector for ExternalScoreDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::External
    }

    fn granularity(&self) -> Granularity {
        Granularity::Transmission
    }

    fn params(&self) -> serde_json::Value {
        json!({ "scores": self.scores.len() })
    }

    fn score(&mut self, store: &EventStore) -> EngineResult<ScoreSet> {
        let mut set = ScoreSet::new(self.name(), store.scenario_id(), Granularity::Transmission);
        let mut disagreements = 0usize;

        for transmission in store.transmissions() {
            let Some(external) = self.scores.get(store.scenario_id(), transmission.key) else {
                set.skip(SkipReason::MissingExternalScore);
                continue;
            };
            let label = transmission.label();
            if external.label.is_some_and(|l| l != label) {
                disagreements += 1;
            }
            set.push(DetectionRecord {
                key: RecordKey::Transmission(transmission.key),
                transmitter: transmission.key.serial_number,
                score: external.score,
                label,
                time: transmission.time(),
            });
        }

        if disagreements > 0 {
            warn!(
                scenario = store.scenario_id(),
                disagreements,
                "external labels disagree with the event log; using the event log"
            );
        }
        Ok(set)
    }
}
