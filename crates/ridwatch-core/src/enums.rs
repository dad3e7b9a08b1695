//! Enumeration types used throughout the engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Row kind in an exported event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A host broadcast a beacon.
    Tx,
    /// A host received a beacon.
    Rx,
}

impl EventType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "TX" | "tx" => Some(EventType::Tx),
            "RX" | "rx" => Some(EventType::Rx),
            _ => None,
        }
    }
}

/// Role of a host in a scenario, as labelled by the export pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostType {
    /// Honest drone broadcasting its true position.
    Benign,
    /// Drone broadcasting a false position.
    Spoofer,
    /// Benign host designated as a trusted multilateration receiver.
    Federate,
    #[default]
    Unknown,
}

impl HostType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "benign" => HostType::Benign,
            "spoofer" => HostType::Spoofer,
            "federate" => HostType::Federate,
            _ => HostType::Unknown,
        }
    }

    /// Benign and federate hosts both count as non-spoofers.
    pub fn is_spoofer(self) -> bool {
        self == HostType::Spoofer
    }
}

/// What a Kalman power filter is keyed by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterScope {
    /// One filter per transmitter serial, fed by every receiver.
    #[default]
    PerTransmitter,
    /// One filter per (receiver, transmitter) link, i.e. a detector per receiving host.
    PerLink,
}

/// Unit a detector emits scores for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One score per reception event.
    Event,
    /// One score per (serial, timestamp) transmission.
    Transmission,
}

/// Which statistic of the position-error filter is the multilateration score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScoreMode {
    /// Smoothed position error estimate (meters).
    #[default]
    SmoothedError,
    /// Normalized innovation squared of the error filter.
    Nis,
}

/// Detector families known to the evaluation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    KalmanPower,
    Multilateration,
    SingleSample,
    External,
}

impl DetectorKind {
    /// Short name used in file names and tables.
    pub fn short_name(self) -> &'static str {
        match self {
            DetectorKind::KalmanPower => "kf",
            DetectorKind::Multilateration => "mlat",
            DetectorKind::SingleSample => "single",
            DetectorKind::External => "external",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kf" | "kalman_power" => Some(DetectorKind::KalmanPower),
            "mlat" | "multilateration" => Some(DetectorKind::Multilateration),
            "single" | "single_sample" => Some(DetectorKind::SingleSample),
            "external" => Some(DetectorKind::External),
            _ => None,
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
