//! Deterministic synthetic scenarios.
//!
//! RSSI is forward-modelled from the true transmitter position with a
//! [`PathLossModel`], plus optional Gaussian noise from a seeded
//! `ChaCha8Rng`, so the same seed always yields the same scenario. Used by
//! tests across the workspace and by the CLI's self-check.

use std::collections::BTreeMap;
use std::path::Path;

use glam::DVec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use ridwatch_core::enums::HostType;
use ridwatch_core::error::{EngineError, EngineResult};
use ridwatch_core::events::ReceptionEvent;
use ridwatch_core::path_loss::PathLossModel;
use ridwatch_core::types::{Position, ReceiverId, TransmitterId};

use crate::reader::{LoadStats, REQUIRED_COLUMNS};
use crate::store::EventStore;

/// Speed of light, for reception time offsets (m/s).
const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// One beacon broadcast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Broadcast {
    pub serial_number: TransmitterId,
    pub rid_timestamp_ms: i64,
    /// Broadcast time (seconds).
    pub time: f64,
    /// Where the transmitter physically is.
    pub true_pos: Position,
    /// Where the beacon says it is.
    pub claimed_pos: Position,
    pub tx_power_dbm: f64,
    pub spoofed: bool,
}

impl Broadcast {
    /// An honest broadcast: claimed position equals the true position.
    pub fn honest(
        serial_number: TransmitterId,
        rid_timestamp_ms: i64,
        pos: Position,
        tx_power_dbm: f64,
    ) -> Self {
        Self {
            serial_number,
            rid_timestamp_ms,
            time: rid_timestamp_ms as f64 / 1000.0,
            true_pos: pos,
            claimed_pos: pos,
            tx_power_dbm,
            spoofed: false,
        }
    }

    /// A spoofed broadcast from `true_pos` claiming `claimed_pos`.
    pub fn spoofed(
        serial_number: TransmitterId,
        rid_timestamp_ms: i64,
        true_pos: Position,
        claimed_pos: Position,
        tx_power_dbm: f64,
    ) -> Self {
        Self {
            serial_number,
            rid_timestamp_ms,
            time: rid_timestamp_ms as f64 / 1000.0,
            true_pos,
            claimed_pos,
            tx_power_dbm,
            spoofed: true,
        }
    }
}

/// A straight-line flight broadcasting at a fixed period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Track {
    pub serial_number: TransmitterId,
    pub start: Position,
    /// Meters per second.
    pub velocity: DVec3,
    pub tx_power_dbm: f64,
    pub start_ms: i64,
    pub period_ms: i64,
    pub count: usize,
    /// Claimed minus true position. `Some` marks every broadcast spoofed.
    pub spoof_offset: Option<DVec3>,
}

#[derive(Debug, Clone, Copy)]
struct Receiver {
    pos: Position,
    host_type: HostType,
}

/// Builds an [`EventStore`] (or an event-log CSV) from receivers and
/// broadcasts.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    scenario_id: String,
    path_loss: PathLossModel,
    noise: Option<Normal<f64>>,
    rng: ChaCha8Rng,
    receivers: BTreeMap<ReceiverId, Receiver>,
    transmitters: BTreeMap<TransmitterId, HostType>,
    broadcasts: Vec<Broadcast>,
    events: Vec<ReceptionEvent>,
}

impl ScenarioBuilder {
    pub fn new(scenario_id: impl Into<String>, seed: u64) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            path_loss: PathLossModel::default(),
            noise: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            receivers: BTreeMap::new(),
            transmitters: BTreeMap::new(),
            broadcasts: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_path_loss(mut self, model: PathLossModel) -> Self {
        self.path_loss = model;
        self
    }

    /// Gaussian RSSI noise with standard deviation `std_db`. Zero disables it.
    pub fn with_rssi_noise(mut self, std_db: f64) -> EngineResult<Self> {
        self.noise = if std_db == 0.0 {
            None
        } else {
            Some(Normal::new(0.0, std_db).map_err(|e| {
                EngineError::config(format!("invalid RSSI noise {std_db}: {e}"))
            })?)
        };
        Ok(self)
    }

    pub fn receiver(&mut self, id: ReceiverId, pos: Position, host_type: HostType) -> &mut Self {
        self.receivers.insert(id, Receiver { pos, host_type });
        self
    }

    pub fn receiver_ids(&self) -> Vec<ReceiverId> {
        self.receivers.keys().copied().collect()
    }

    /// Broadcast to every receiver.
    pub fn broadcast(&mut self, broadcast: Broadcast) -> &mut Self {
        let ids = self.receiver_ids();
        self.broadcast_to(broadcast, &ids)
    }

    /// Broadcast heard only by `receivers`. Unknown ids are ignored.
    pub fn broadcast_to(&mut self, broadcast: Broadcast, receivers: &[ReceiverId]) -> &mut Self {
        let role = if broadcast.spoofed {
            HostType::Spoofer
        } else {
            HostType::Benign
        };
        self.transmitters
            .entry(broadcast.serial_number)
            .and_modify(|t| {
                if role == HostType::Spoofer {
                    *t = role;
                }
            })
            .or_insert(role);
        self.broadcasts.push(broadcast);

        for id in receivers {
            let Some(rx) = self.receivers.get(id).copied() else {
                continue;
            };
            let distance = rx.pos.range_to(&broadcast.true_pos);
            let mut rssi = self.path_loss.rx_power_dbm(broadcast.tx_power_dbm, distance);
            if let Some(noise) = &self.noise {
                rssi += noise.sample(&mut self.rng);
            }
            self.events.push(ReceptionEvent {
                time: broadcast.time + distance / SPEED_OF_LIGHT,
                receiver_id: *id,
                receiver_type: rx.host_type,
                receiver_pos: rx.pos,
                tx_serial_number: broadcast.serial_number,
                tx_timestamp_ms: broadcast.rid_timestamp_ms,
                claimed_pos: broadcast.claimed_pos,
                claimed_speed_vertical: None,
                claimed_speed_horizontal: None,
                claimed_heading: None,
                rssi_dbm: rssi,
                is_spoofed: broadcast.spoofed,
            });
        }
        self
    }

    /// Fly a straight track, broadcasting to every receiver.
    pub fn track(&mut self, track: Track) -> &mut Self {
        let start = track.start.to_dvec3();
        for i in 0..track.count {
            let ts = track.start_ms + i as i64 * track.period_ms;
            let elapsed = (ts - track.start_ms) as f64 / 1000.0;
            let true_pos = Position::from(start + track.velocity * elapsed);
            let broadcast = match track.spoof_offset {
                Some(offset) => Broadcast::spoofed(
                    track.serial_number,
                    ts,
                    true_pos,
                    Position::from(true_pos.to_dvec3() + offset),
                    track.tx_power_dbm,
                ),
                None => Broadcast::honest(track.serial_number, ts, true_pos, track.tx_power_dbm),
            };
            self.broadcast(broadcast);
        }
        self
    }

    fn hosts(&self) -> BTreeMap<ReceiverId, HostType> {
        let mut hosts: BTreeMap<ReceiverId, HostType> = self
            .receivers
            .iter()
            .map(|(id, rx)| (*id, rx.host_type))
            .collect();
        for (id, host_type) in &self.transmitters {
            hosts.entry(*id).or_insert(*host_type);
        }
        hosts
    }

    pub fn build(&self) -> EventStore {
        let stats = LoadStats {
            rows_read: self.broadcasts.len() + self.events.len(),
            tx_rows: self.broadcasts.len(),
            rx_rows: self.events.len(),
            dropped: BTreeMap::new(),
        };
        EventStore::new(
            self.scenario_id.clone(),
            self.events.clone(),
            self.hosts(),
            stats,
        )
    }

    /// Write the scenario as an event log readable by
    /// [`read_event_log_file`](crate::reader::read_event_log_file).
    pub fn write_csv(&self, path: &Path) -> EngineResult<()> {
        let csv_err = |e: csv::Error| EngineError::Csv {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
        wtr.write_record(REQUIRED_COLUMNS).map_err(csv_err)?;

        let hosts = self.hosts();
        let role = |id: &ReceiverId| host_type_name(hosts.get(id).copied().unwrap_or_default());

        for b in &self.broadcasts {
            wtr.write_record(&[
                b.time.to_string(),
                "TX".to_string(),
                b.serial_number.to_string(),
                b.serial_number.to_string(),
                b.rid_timestamp_ms.to_string(),
                b.true_pos.x.to_string(),
                b.true_pos.y.to_string(),
                b.true_pos.z.to_string(),
                b.claimed_pos.x.to_string(),
                b.claimed_pos.y.to_string(),
                b.claimed_pos.z.to_string(),
                String::new(),
                flag(b.spoofed).to_string(),
                role(&b.serial_number).to_string(),
            ])
            .map_err(csv_err)?;
        }

        for e in &self.events {
            wtr.write_record(&[
                e.time.to_string(),
                "RX".to_string(),
                e.receiver_id.to_string(),
                e.tx_serial_number.to_string(),
                e.tx_timestamp_ms.to_string(),
                e.receiver_pos.x.to_string(),
                e.receiver_pos.y.to_string(),
                e.receiver_pos.z.to_string(),
                e.claimed_pos.x.to_string(),
                e.claimed_pos.y.to_string(),
                e.claimed_pos.z.to_string(),
                e.rssi_dbm.to_string(),
                flag(e.is_spoofed).to_string(),
                role(&e.receiver_id).to_string(),
            ])
            .map_err(csv_err)?;
        }

        wtr.flush().map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn host_type_name(host_type: HostType) -> &'static str {
    match host_type {
        HostType::Benign => "benign",
        HostType::Spoofer => "spoofer",
        HostType::Federate => "federate",
        HostType::Unknown => "unknown",
    }
}
