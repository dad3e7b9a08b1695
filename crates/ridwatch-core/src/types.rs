//! Fundamental geometric and identity types.

use std::cmp::Ordering;
use std::fmt;

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Transmitter identity (Remote ID serial number).
pub type TransmitterId = u32;

/// Receiver identity (simulation host id).
pub type ReceiverId = u32;

/// 3D position in scenario space (meters, Cartesian).
/// x = East, y = North, z = Up (altitude).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Straight-line distance in meters.
    pub fn range_to(&self, other: &Position) -> f64 {
        self.to_dvec3().distance(other.to_dvec3())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_dvec3(self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }
}

impl From<DVec3> for Position {
    fn from(v: DVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Identifies one broadcast instant from one transmitter.
///
/// Ordered by timestamp first, then serial, which is the order the
/// multilateration detector consumes transmissions in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransmissionKey {
    pub serial_number: TransmitterId,
    /// Remote ID message timestamp (ms since scenario start).
    pub rid_timestamp_ms: i64,
}

impl TransmissionKey {
    pub fn new(serial_number: TransmitterId, rid_timestamp_ms: i64) -> Self {
        Self {
            serial_number,
            rid_timestamp_ms,
        }
    }
}

impl Ord for TransmissionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rid_timestamp_ms
            .cmp(&other.rid_timestamp_ms)
            .then(self.serial_number.cmp(&other.serial_number))
    }
}

impl PartialOrd for TransmissionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TransmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sn={}@{}ms", self.serial_number, self.rid_timestamp_ms)
    }
}

/// A (receiver, transmitter) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId {
    pub receiver_id: ReceiverId,
    pub serial_number: TransmitterId,
}
