//! In-memory, indexed event store for one scenario.
//!
//! Reception events are kept in non-decreasing time order (stable with
//! respect to file order), and indexed by transmitter serial and by
//! transmission key. The store is immutable after construction; detectors
//! borrow it.

use std::collections::BTreeMap;
use std::path::Path;

use ridwatch_core::enums::HostType;
use ridwatch_core::error::EngineResult;
use ridwatch_core::events::ReceptionEvent;
use ridwatch_core::types::{Position, ReceiverId, TransmissionKey, TransmitterId};

use crate::reader::{read_event_log_file, LoadStats, ParsedLog};

/// Indexed reception events of one scenario.
#[derive(Debug, Clone)]
pub struct EventStore {
    scenario_id: String,
    events: Vec<ReceptionEvent>,
    hosts: BTreeMap<ReceiverId, HostType>,
    transmissions: BTreeMap<TransmissionKey, Vec<usize>>,
    by_transmitter: BTreeMap<TransmitterId, Vec<usize>>,
    stats: LoadStats,
}

/// All receptions of one broadcast instant, borrowed from a store.
#[derive(Debug, Clone)]
pub struct Transmission<'a> {
    pub key: TransmissionKey,
    /// `(event index, event)` in reception time order.
    pub events: Vec<(usize, &'a ReceptionEvent)>,
}

impl<'a> Transmission<'a> {
    /// Ground truth of the broadcast. All receptions share it.
    pub fn label(&self) -> bool {
        self.events.iter().any(|(_, e)| e.is_spoofed)
    }

    /// Earliest reception time.
    pub fn time(&self) -> f64 {
        self.events
            .iter()
            .map(|(_, e)| e.time)
            .fold(f64::INFINITY, f64::min)
    }

    /// Position claimed in the beacon payload.
    pub fn claimed_pos(&self) -> Option<Position> {
        self.events.first().map(|(_, e)| e.claimed_pos)
    }

    pub fn receivers(&self) -> impl Iterator<Item = ReceiverId> + '_ {
        self.events.iter().map(|(_, e)| e.receiver_id)
    }
}

impl EventStore {
    /// Build a store from already-parsed events. Hosts seen only as
    /// receivers are registered with their event's receiver type.
    pub fn new(
        scenario_id: impl Into<String>,
        mut events: Vec<ReceptionEvent>,
        mut hosts: BTreeMap<ReceiverId, HostType>,
        stats: LoadStats,
    ) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut transmissions: BTreeMap<TransmissionKey, Vec<usize>> = BTreeMap::new();
        let mut by_transmitter: BTreeMap<TransmitterId, Vec<usize>> = BTreeMap::new();
        for (idx, event) in events.iter().enumerate() {
            transmissions
                .entry(event.transmission_key())
                .or_default()
                .push(idx);
            by_transmitter
                .entry(event.tx_serial_number)
                .or_default()
                .push(idx);
            hosts.entry(event.receiver_id).or_insert(event.receiver_type);
        }

        Self {
            scenario_id: scenario_id.into(),
            events,
            hosts,
            transmissions,
            by_transmitter,
            stats,
        }
    }

    pub fn from_log(scenario_id: impl Into<String>, log: ParsedLog) -> Self {
        Self::new(scenario_id, log.events, log.hosts, log.stats)
    }

    /// Load a scenario CSV. The scenario id is the file name.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let log = read_event_log_file(path)?;
        let scenario_id = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("scenario")
            .to_string();
        Ok(Self::from_log(scenario_id, log))
    }

    pub fn scenario_id(&self) -> &str {
        &self.scenario_id
    }

    /// Reception events in time order. Indices are stable record keys.
    pub fn events(&self) -> &[ReceptionEvent] {
        &self.events
    }

    pub fn event(&self, idx: usize) -> Option<&ReceptionEvent> {
        self.events.get(idx)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn n_spoofed(&self) -> usize {
        self.events.iter().filter(|e| e.is_spoofed).count()
    }

    pub fn hosts(&self) -> &BTreeMap<ReceiverId, HostType> {
        &self.hosts
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    pub fn transmitters(&self) -> impl Iterator<Item = TransmitterId> + '_ {
        self.by_transmitter.keys().copied()
    }

    /// Events of one transmitter, in time order.
    pub fn events_for_transmitter(
        &self,
        serial_number: TransmitterId,
    ) -> impl Iterator<Item = (usize, &ReceptionEvent)> + '_ {
        self.by_transmitter
            .get(&serial_number)
            .into_iter()
            .flatten()
            .map(move |&idx| (idx, &self.events[idx]))
    }

    pub fn transmission_count(&self) -> usize {
        self.transmissions.len()
    }

    /// Transmissions ordered by timestamp, then serial.
    pub fn transmissions(&self) -> impl Iterator<Item = Transmission<'_>> + '_ {
        self.transmissions
            .iter()
            .map(move |(key, indices)| self.view(*key, indices))
    }

    pub fn transmission(&self, key: TransmissionKey) -> Option<Transmission<'_>> {
        self.transmissions
            .get(&key)
            .map(|indices| self.view(key, indices))
    }

    fn view(&self, key: TransmissionKey, indices: &[usize]) -> Transmission<'_> {
        Transmission {
            key,
            events: indices.iter().map(|&i| (i, &self.events[i])).collect(),
        }
    }
}
