//! Reference-sample detector.
//!
//! The first sample on each (receiver, transmitter) link fixes a reference
//! transmit power by path-loss inversion at the claimed range. Later samples
//! are scored by how far their RSSI is from what that reference predicts at
//! the newly claimed range.

use std::collections::HashMap;

use serde_json::json;
use tracing::debug;

use ridwatch_core::config::SingleSampleConfig;
use ridwatch_core::enums::{DetectorKind, Granularity};
use ridwatch_core::error::{EngineError, EngineResult};
use ridwatch_core::events::ReceptionEvent;
use ridwatch_core::path_loss::PathLossModel;
use ridwatch_core::records::{DetectionRecord, RecordKey, SkipReason};
use ridwatch_core::types::LinkId;
use ridwatch_store::EventStore;

use crate::detector::{Detector, Outcome, ScoreSet};

#[derive(Debug, Clone, Copy)]
struct Reference {
    tx_power_dbm: f64,
    last_time: f64,
}

#[derive(Debug, Clone)]
pub struct SingleSampleDetector {
    config: SingleSampleConfig,
    path_loss: PathLossModel,
    references: HashMap<LinkId, Reference>,
    alarms: usize,
}

impl SingleSampleDetector {
    pub fn new(config: SingleSampleConfig) -> Self {
        Self {
            path_loss: config.path_loss(),
            config,
            references: HashMap::new(),
            alarms: 0,
        }
    }

    pub fn alarms(&self) -> usize {
        self.alarms
    }

    pub fn reset(&mut self) {
        self.references.clear();
        self.alarms = 0;
    }

    /// Absolute RSSI deviation (dB) from the link's reference prediction.
    pub fn score_event(&mut self, event: &ReceptionEvent) -> EngineResult<Outcome<f64>> {
        let distance = event.claimed_range();
        if !distance.is_finite() || !event.rssi_dbm.is_finite() {
            return Ok(Outcome::Skipped(SkipReason::NonFinite));
        }

        let link = event.link();
        let Some(reference) = self.references.get_mut(&link) else {
            self.references.insert(
                link,
                Reference {
                    tx_power_dbm: self.path_loss.tx_power_dbm(event.rssi_dbm, distance),
                    last_time: event.time,
                },
            );
            return Ok(Outcome::Skipped(SkipReason::Bootstrap));
        };

        if event.time < reference.last_time {
            return Err(EngineError::OutOfOrder {
                filter: format!("{link:?}"),
                previous: reference.last_time,
                current: event.time,
            });
        }
        reference.last_time = event.time;

        let expected = self.path_loss.rx_power_dbm(reference.tx_power_dbm, distance);
        let deviation = (expected - event.rssi_dbm).abs();
        if deviation > self.config.alarm_db {
            self.alarms += 1;
        }
        Ok(Outcome::Scored(deviation))
    }
}

impl Detector for SingleSampleDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::SingleSample
    }

    fn granularity(&self) -> Granularity {
        Granularity::Event
    }

    fn params(&self) -> serde_json::Value {
        json!({
            "path_loss_exponent": self.config.path_loss_exponent,
            "carrier_mhz": self.config.carrier_mhz,
            "alarm_db": self.config.alarm_db,
        })
    }

    fn score(&mut self, store: &EventStore) -> EngineResult<ScoreSet> {
        self.reset();
        let mut set = ScoreSet::new(self.name(), store.scenario_id(), Granularity::Event);

        for (idx, event) in store.events().iter().enumerate() {
            match self.score_event(event)? {
                Outcome::Scored(score) => set.push(DetectionRecord {
                    key: RecordKey::Event(idx),
                    transmitter: event.tx_serial_number,
                    score,
                    label: event.is_spoofed,
                    time: event.time,
                }),
                Outcome::Skipped(reason) => set.skip(reason),
            }
        }

        debug!(
            scenario = store.scenario_id(),
            scored = set.tally.scored,
            links = self.references.len(),
            alarms = self.alarms,
            "single sample scoring done"
        );
        Ok(set)
    }
}
