//! Bringing detectors onto a common unit.
//!
//! Per-event scores are lifted to one score per transmission by taking the
//! maximum over federate receivers. Transmission-level score sets can then
//! be restricted to the transmissions every detector scored.

use std::collections::{BTreeMap, HashSet};

use ridwatch_core::enums::Granularity;
use ridwatch_core::records::{DetectionRecord, RecordKey};
use ridwatch_core::types::TransmissionKey;
use ridwatch_detect::ScoreSet;
use ridwatch_store::{EventStore, FederateSet};

/// Max per-event score over federate receivers, per transmission.
/// Transmission-level sets are returned unchanged.
pub fn to_transmission_level(set: &ScoreSet, store: &EventStore, federates: &FederateSet) -> ScoreSet {
    if set.granularity == Granularity::Transmission {
        return set.clone();
    }

    let mut grouped: BTreeMap<TransmissionKey, DetectionRecord> = BTreeMap::new();
    for record in &set.records {
        let RecordKey::Event(idx) = record.key else {
            continue;
        };
        let Some(event) = store.event(idx) else {
            continue;
        };
        if !federates.contains(event.receiver_id) {
            continue;
        }
        let key = event.transmission_key();
        grouped
            .entry(key)
            .and_modify(|agg| {
                agg.score = agg.score.max(record.score);
                agg.label |= record.label;
                agg.time = agg.time.min(record.time);
            })
            .or_insert(DetectionRecord {
                key: RecordKey::Transmission(key),
                transmitter: record.transmitter,
                score: record.score,
                label: record.label,
                time: record.time,
            });
    }

    let mut out = ScoreSet::new(set.detector.clone(), set.scenario_id.clone(), Granularity::Transmission);
    out.tally.skipped = set.tally.skipped.clone();
    for record in grouped.into_values() {
        out.push(record);
    }
    out
}

/// Restrict each detector's sets to the records every detector has.
///
/// `per_detector[d][s]` is detector `d`'s set for scenario `s`; all detectors
/// must list scenarios in the same order.
pub fn restrict_to_common(per_detector: &[Vec<ScoreSet>]) -> Vec<Vec<ScoreSet>> {
    let keys = |sets: &[ScoreSet]| -> HashSet<(String, RecordKey)> {
        sets.iter()
            .flat_map(|s| s.records.iter().map(move |r| (s.scenario_id.clone(), r.key)))
            .collect()
    };

    let mut iter = per_detector.iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let common = iter.fold(keys(first), |acc, sets| {
        let other = keys(sets);
        acc.into_iter().filter(|k| other.contains(k)).collect()
    });

    per_detector
        .iter()
        .map(|sets| {
            sets.iter()
                .map(|s| {
                    let mut kept = s.clone();
                    kept.records
                        .retain(|r| common.contains(&(s.scenario_id.clone(), r.key)));
                    kept.tally.scored = kept.records.len();
                    kept
                })
                .collect()
        })
        .collect()
}
