//! Reception events — the unit of input produced by the external simulator.

use serde::{Deserialize, Serialize};

use crate::enums::HostType;
use crate::types::{LinkId, Position, ReceiverId, TransmissionKey, TransmitterId};

/// One beacon received by one host.
///
/// Immutable once loaded. Claimed fields come from the beacon payload and
/// may be false; `receiver_pos` and `rssi_dbm` are physical observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptionEvent {
    /// Reception time (seconds since scenario start).
    pub time: f64,
    pub receiver_id: ReceiverId,
    /// Role of the receiving host.
    pub receiver_type: HostType,
    pub receiver_pos: Position,
    pub tx_serial_number: TransmitterId,
    pub tx_timestamp_ms: i64,
    pub claimed_pos: Position,
    pub claimed_speed_vertical: Option<f64>,
    pub claimed_speed_horizontal: Option<f64>,
    pub claimed_heading: Option<f64>,
    pub rssi_dbm: f64,
    /// Ground truth: the beacon came from a spoofer.
    pub is_spoofed: bool,
}

impl ReceptionEvent {
    pub fn transmission_key(&self) -> TransmissionKey {
        TransmissionKey::new(self.tx_serial_number, self.tx_timestamp_ms)
    }

    pub fn link(&self) -> LinkId {
        LinkId {
            receiver_id: self.receiver_id,
            serial_number: self.tx_serial_number,
        }
    }

    /// Distance between the receiver and the position the beacon claims.
    pub fn claimed_range(&self) -> f64 {
        self.receiver_pos.range_to(&self.claimed_pos)
    }

    /// Geometry and signal are usable for path-loss inversion.
    pub fn is_physically_valid(&self) -> bool {
        self.time.is_finite()
            && self.rssi_dbm.is_finite()
            && self.receiver_pos.is_finite()
            && self.claimed_pos.is_finite()
    }
}
