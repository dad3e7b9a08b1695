//! Classification metrics at a fixed threshold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ridwatch_core::records::DetectionRecord;
use ridwatch_core::types::TransmitterId;
use ridwatch_store::EventStore;

/// Confusion counts with `score >= threshold` as positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confusion {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl Confusion {
    pub fn at_threshold<'a>(records: impl IntoIterator<Item = &'a DetectionRecord>, threshold: f64) -> Self {
        let mut c = Self::default();
        for r in records {
            match (r.score >= threshold, r.label) {
                (true, true) => c.tp += 1,
                (true, false) => c.fp += 1,
                (false, false) => c.tn += 1,
                (false, true) => c.fn_ += 1,
            }
        }
        c
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn tpr(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn fpr(&self) -> f64 {
        ratio(self.fp, self.fp + self.tn)
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Time of each spoofing transmitter's first spoofed reception in one
/// scenario.
pub type SpoofOnsets = BTreeMap<TransmitterId, f64>;

/// Onsets read from the event log. Receptions a detector skipped still count.
pub fn spoof_onsets(store: &EventStore) -> SpoofOnsets {
    let mut onsets = SpoofOnsets::new();
    for event in store.events().iter().filter(|e| e.is_spoofed) {
        onsets
            .entry(event.tx_serial_number)
            .and_modify(|t: &mut f64| *t = t.min(event.time))
            .or_insert(event.time);
    }
    onsets
}

/// Delay from a spoofer's first spoofed observation to its first detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeToDetection {
    /// Spoofed transmitters that crossed the threshold.
    pub detected: usize,
    /// Spoofed transmitters that never did, including those with no
    /// scored record.
    pub not_detected: usize,
    /// Seconds; absent when nothing was detected.
    pub mean_s: Option<f64>,
    pub median_s: Option<f64>,
    pub delays_s: Vec<f64>,
}

impl TimeToDetection {
    /// `scenarios` yields each scenario's records with its spoof onsets.
    /// Transmitters are tracked per scenario; serial numbers may repeat
    /// across scenarios. A transmitter's delay runs from the earlier of its
    /// onset and its first spoofed record.
    pub fn compute<'a, I>(scenarios: I, threshold: f64) -> Self
    where
        I: IntoIterator<Item = (&'a [DetectionRecord], &'a SpoofOnsets)>,
    {
        let mut ttd = Self::default();
        for (records, onsets) in scenarios {
            let mut spoofed: BTreeMap<TransmitterId, Vec<&DetectionRecord>> = onsets
                .keys()
                .map(|&serial| (serial, Vec::new()))
                .collect();
            for r in records.iter().filter(|r| r.label) {
                spoofed.entry(r.transmitter).or_default().push(r);
            }
            for (serial, mut track) in spoofed {
                track.sort_by(|a, b| a.time.total_cmp(&b.time));
                let first_record = track.first().map_or(f64::INFINITY, |r| r.time);
                let start = onsets.get(&serial).map_or(first_record, |&t| t.min(first_record));
                match track.iter().find(|r| r.score >= threshold) {
                    Some(hit) => {
                        ttd.detected += 1;
                        ttd.delays_s.push(hit.time - start);
                    }
                    None => ttd.not_detected += 1,
                }
            }
        }

        if !ttd.delays_s.is_empty() {
            let n = ttd.delays_s.len();
            ttd.mean_s = Some(ttd.delays_s.iter().sum::<f64>() / n as f64);
            let mut sorted = ttd.delays_s.clone();
            sorted.sort_by(f64::total_cmp);
            ttd.median_s = Some(if n % 2 == 1 {
                sorted[n / 2]
            } else {
                0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
            });
        }
        ttd
    }
}

/// Everything reported for one detector on one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetrics {
    pub threshold: f64,
    pub auc: f64,
    pub tpr: f64,
    pub fpr: f64,
    pub accuracy: f64,
    pub confusion: Confusion,
    pub time_to_detection: TimeToDetection,
    pub n_records: usize,
    pub n_spoofed: usize,
}
