//! Kalman transmit-power detector.
//!
//! Inverts each reception's RSSI through the path-loss model at the claimed
//! range to get the transmit power the beacon implies, and tracks that power
//! as a slowly varying state. A spoofer broadcasting from elsewhere implies
//! a transmit power inconsistent with its history, which shows up as a
//! large normalized innovation.

use serde_json::json;
use tracing::{debug, warn};

use ridwatch_core::config::PowerDetectorConfig;
use ridwatch_core::constants::{NIS_CHI2_99, POWER_CORRECTION_ALARM_DB};
use ridwatch_core::enums::{DetectorKind, FilterScope, Granularity};
use ridwatch_core::error::EngineResult;
use ridwatch_core::events::ReceptionEvent;
use ridwatch_core::path_loss::PathLossModel;
use ridwatch_core::records::{DetectionRecord, RecordKey, SkipReason};
use ridwatch_core::types::{LinkId, TransmitterId};
use ridwatch_store::EventStore;

use crate::detector::{Detector, Outcome, ScoreSet};
use crate::kalman::{FilterBank, FilterStep, KalmanUpdate};

/// Filter key under the configured scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PowerKey {
    Transmitter(TransmitterId),
    Link(LinkId),
}

#[derive(Debug, Clone)]
pub struct KalmanPowerDetector {
    config: PowerDetectorConfig,
    path_loss: PathLossModel,
    filters: FilterBank<PowerKey>,
    alarms: usize,
}

impl KalmanPowerDetector {
    pub fn new(config: PowerDetectorConfig) -> Self {
        Self {
            path_loss: config.path_loss(),
            filters: FilterBank::new(config.noise),
            config,
            alarms: 0,
        }
    }

    pub fn config(&self) -> &PowerDetectorConfig {
        &self.config
    }

    /// Updates since the last reset whose NIS exceeded the 99% bound.
    pub fn alarms(&self) -> usize {
        self.alarms
    }

    pub fn reset(&mut self) {
        self.filters.clear();
        self.alarms = 0;
    }

    /// Score one event. Events of a filter must arrive in non-decreasing time.
    pub fn score_event(&mut self, event: &ReceptionEvent) -> EngineResult<Outcome<KalmanUpdate>> {
        let distance = event.claimed_range();
        if !distance.is_finite() || !event.rssi_dbm.is_finite() {
            warn!(
                receiver = event.receiver_id,
                serial = event.tx_serial_number,
                time = event.time,
                "non-finite distance or RSSI, event not scored"
            );
            return Ok(Outcome::Skipped(SkipReason::NonFinite));
        }

        let implied_tx = self.path_loss.tx_power_dbm(event.rssi_dbm, distance);
        let key = match self.config.scope {
            FilterScope::PerTransmitter => PowerKey::Transmitter(event.tx_serial_number),
            FilterScope::PerLink => PowerKey::Link(event.link()),
        };

        match self.filters.observe(key, event.time, implied_tx)? {
            FilterStep::Initialized { .. } => Ok(Outcome::Skipped(SkipReason::Bootstrap)),
            FilterStep::Updated(update) => {
                if update.nis > NIS_CHI2_99 || update.correction > POWER_CORRECTION_ALARM_DB {
                    self.alarms += 1;
                    debug!(
                        serial = event.tx_serial_number,
                        receiver = event.receiver_id,
                        time = event.time,
                        nis = update.nis,
                        correction = update.correction,
                        "transmit power inconsistent with history"
                    );
                }
                Ok(Outcome::Scored(update))
            }
        }
    }
}

impl Detector for KalmanPowerDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::KalmanPower
    }

    fn granularity(&self) -> Granularity {
        Granularity::Event
    }

    fn params(&self) -> serde_json::Value {
        json!({
            "path_loss_exponent": self.config.path_loss_exponent,
            "carrier_mhz": self.config.carrier_mhz,
            "process_noise": self.config.noise.process_noise,
            "measurement_noise": self.config.noise.measurement_noise,
            "initial_variance": self.config.noise.initial_variance,
            "scope": self.config.scope,
        })
    }

    fn score(&mut self, store: &EventStore) -> EngineResult<ScoreSet> {
        self.reset();
        let mut set = ScoreSet::new(self.name(), store.scenario_id(), Granularity::Event);

        for (idx, event) in store.events().iter().enumerate() {
            match self.score_event(event)? {
                Outcome::Scored(update) => set.push(DetectionRecord {
                    key: RecordKey::Event(idx),
                    transmitter: event.tx_serial_number,
                    score: update.nis,
                    label: event.is_spoofed,
                    time: event.time,
                }),
                Outcome::Skipped(reason) => set.skip(reason),
            }
        }

        debug!(
            scenario = store.scenario_id(),
            scored = set.tally.scored,
            skipped = set.tally.skipped_total(),
            filters = self.filters.len(),
            alarms = self.alarms,
            "kalman power scoring done"
        );
        Ok(set)
    }
}
