//! Tests for event-log parsing, indexing, federate policies, and datasets.

use std::io::Cursor;
use std::path::Path;

use glam::DVec3;

use ridwatch_core::config::FederatePolicy;
use ridwatch_core::enums::HostType;
use ridwatch_core::error::EngineError;
use ridwatch_core::records::DropReason;
use ridwatch_core::types::{Position, TransmissionKey};

use crate::dataset::{list_scenarios, load_dataset};
use crate::federate::FederateSet;
use crate::reader::read_event_log;
use crate::store::EventStore;
use crate::synthetic::{Broadcast, ScenarioBuilder, Track};

const HEADER: &str = "time,event_type,host_id,serial_number,rid_timestamp,pos_x,pos_y,pos_z,rid_pos_x,rid_pos_y,rid_pos_z,rssi,is_spoofed,host_type";

fn parse(body: &str) -> crate::reader::ParsedLog {
    let text = format!("{HEADER}\n{body}");
    read_event_log(Cursor::new(text), Path::new("inline.csv")).unwrap()
}

fn square_receivers(builder: &mut ScenarioBuilder, host_type: HostType) {
    builder
        .receiver(1, Position::new(0.0, 0.0, 0.0), host_type)
        .receiver(2, Position::new(200.0, 0.0, 5.0), host_type)
        .receiver(3, Position::new(0.0, 200.0, 10.0), host_type)
        .receiver(4, Position::new(200.0, 200.0, 30.0), host_type);
}

// ---- Reader ----

#[test]
fn test_reader_parses_rx_rows_only() {
    let log = parse(
        "0.0,TX,100,100,0,50,50,10,50,50,10,,0,benign\n\
         0.001,RX,1,100,0,0,0,0,50,50,10,-60.5,0,benign\n\
         0.002,RX,2,100,0,100,0,0,50,50,10,-61.0,0,federate\n",
    );
    assert_eq!(log.events.len(), 2);
    assert_eq!(log.stats.tx_rows, 1);
    assert_eq!(log.stats.rx_rows, 2);
    assert_eq!(log.stats.dropped_total(), 0);

    let e = &log.events[1];
    assert_eq!(e.receiver_id, 2);
    assert_eq!(e.receiver_type, HostType::Federate);
    assert_eq!(e.transmission_key(), TransmissionKey::new(100, 0));
    assert_eq!(e.receiver_pos, Position::new(100.0, 0.0, 0.0));
    assert!((e.rssi_dbm + 61.0).abs() < 1e-12);
    assert!(!e.is_spoofed);

    // TX rows register the transmitter's role.
    assert_eq!(log.hosts.get(&100), Some(&HostType::Benign));
}

#[test]
fn test_reader_drops_malformed_rows_by_reason() {
    let log = parse(
        "0.0,RX,1,100,0,0,0,0,50,50,10,,0,benign\n\
         0.0,RX,1,100,0,0,0,0,50,50,10,abc,0,benign\n\
         0.0,RX,1,100,0,0,0,0,50,50,NaN,-60,0,benign\n\
         0.0,RX,1,100,0,0,0,0,50,50,10,-60,maybe,benign\n\
         0.0,RX,1,100\n\
         0.0,RX,1,100,0,0,0,0,50,50,10,-60,1,benign\n",
    );
    assert_eq!(log.events.len(), 1);
    assert!(log.events[0].is_spoofed);
    assert_eq!(log.stats.dropped.get(&DropReason::MissingField), Some(&1));
    assert_eq!(log.stats.dropped.get(&DropReason::InvalidField), Some(&2));
    assert_eq!(log.stats.dropped.get(&DropReason::NonFiniteValue), Some(&1));
    assert_eq!(log.stats.dropped.get(&DropReason::UnreadableRow), Some(&1));
    assert_eq!(log.stats.dropped_total(), 5);
}

#[test]
fn test_reader_missing_column_rejects_file() {
    let text = "time,event_type,host_id\n0.0,RX,1\n";
    let err = read_event_log(Cursor::new(text), Path::new("bad.csv")).unwrap_err();
    match err {
        EngineError::MissingColumn { column, .. } => assert_eq!(column, "serial_number"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_reader_optional_columns() {
    let text = format!(
        "{HEADER},rid_speed_vertical,rid_heading\n\
         0.0,RX,1,100,0,0,0,0,50,50,10,-60,0,benign,1.5,\n"
    );
    let log = read_event_log(Cursor::new(text), Path::new("opt.csv")).unwrap();
    let e = &log.events[0];
    assert_eq!(e.claimed_speed_vertical, Some(1.5));
    assert_eq!(e.claimed_heading, None);
    assert_eq!(e.claimed_speed_horizontal, None);
}

#[test]
fn test_reader_accepts_integral_float_ids() {
    let log = parse("0.0,RX,1.0,100.0,2000.0,0,0,0,50,50,10,-60,0.0,benign\n");
    assert_eq!(log.events.len(), 1);
    assert_eq!(log.events[0].transmission_key(), TransmissionKey::new(100, 2000));
}

// ---- Store ----

#[test]
fn test_store_orders_events_by_time() {
    let log = parse(
        "2.0,RX,1,100,2000,0,0,0,50,50,10,-60,0,benign\n\
         1.0,RX,2,100,1000,0,0,0,50,50,10,-60,0,benign\n\
         1.0,RX,1,100,1000,0,0,0,50,50,10,-60,0,benign\n",
    );
    let store = EventStore::from_log("s", log);
    let times: Vec<f64> = store.events().iter().map(|e| e.time).collect();
    assert_eq!(times, vec![1.0, 1.0, 2.0]);
    // Stable: equal times keep file order.
    assert_eq!(store.events()[0].receiver_id, 2);
}

#[test]
fn test_store_groups_transmissions() {
    let mut builder = ScenarioBuilder::new("grouping", 1);
    square_receivers(&mut builder, HostType::Benign);
    let pos = Position::new(100.0, 100.0, 20.0);
    builder
        .broadcast(Broadcast::honest(500, 2000, pos, 14.0))
        .broadcast(Broadcast::honest(400, 2000, pos, 14.0))
        .broadcast_to(Broadcast::honest(500, 1000, pos, 14.0), &[1, 2]);
    let store = builder.build();

    assert_eq!(store.len(), 10);
    assert_eq!(store.transmission_count(), 3);

    let keys: Vec<TransmissionKey> = store.transmissions().map(|t| t.key).collect();
    assert_eq!(
        keys,
        vec![
            TransmissionKey::new(500, 1000),
            TransmissionKey::new(400, 2000),
            TransmissionKey::new(500, 2000),
        ]
    );

    let first = store.transmission(TransmissionKey::new(500, 1000)).unwrap();
    let mut heard: Vec<_> = first.receivers().collect();
    heard.sort();
    assert_eq!(heard, vec![1, 2]);
    assert!(!first.label());

    assert_eq!(store.events_for_transmitter(500).count(), 6);
    assert_eq!(store.transmitters().collect::<Vec<_>>(), vec![400, 500]);
}

#[test]
fn test_synthetic_rssi_follows_path_loss() {
    let mut builder = ScenarioBuilder::new("fspl", 7);
    builder.receiver(1, Position::new(0.0, 0.0, 0.0), HostType::Benign);
    builder.broadcast(Broadcast::honest(9, 0, Position::new(1000.0, 0.0, 0.0), 14.0));
    let store = builder.build();
    // 14 dBm - 100.04 dB at 1 km.
    assert!((store.events()[0].rssi_dbm - (14.0 - 100.0442)).abs() < 1e-3);
}

#[test]
fn test_synthetic_noise_is_seeded() {
    let make = |seed| {
        let mut b = ScenarioBuilder::new("noise", seed)
            .with_rssi_noise(2.0)
            .unwrap();
        square_receivers(&mut b, HostType::Benign);
        b.track(Track {
            serial_number: 100,
            start: Position::new(50.0, 50.0, 40.0),
            velocity: DVec3::new(5.0, 0.0, 0.0),
            tx_power_dbm: 14.0,
            start_ms: 0,
            period_ms: 1000,
            count: 5,
            spoof_offset: None,
        });
        b.build()
            .events()
            .iter()
            .map(|e| e.rssi_dbm)
            .collect::<Vec<_>>()
    };
    assert_eq!(make(3), make(3));
    assert_ne!(make(3), make(4));
}

#[test]
fn test_track_marks_spoofed_broadcasts() {
    let mut builder = ScenarioBuilder::new("spoof", 1);
    square_receivers(&mut builder, HostType::Benign);
    builder.track(Track {
        serial_number: 300,
        start: Position::new(100.0, 100.0, 50.0),
        velocity: DVec3::ZERO,
        tx_power_dbm: 10.0,
        start_ms: 0,
        period_ms: 500,
        count: 3,
        spoof_offset: Some(DVec3::new(400.0, 0.0, 0.0)),
    });
    let store = builder.build();
    assert_eq!(store.n_spoofed(), 12);
    assert_eq!(store.hosts().get(&300), Some(&HostType::Spoofer));
    let e = &store.events()[0];
    assert!((e.claimed_pos.x - 500.0).abs() < 1e-9);
}

// ---- Federates ----

#[test]
fn test_federate_set_rejects_small_or_duplicate() {
    assert!(FederateSet::new(vec![1, 2, 3]).is_err());
    assert!(FederateSet::new(vec![1, 2, 3, 3]).is_err());
    let set = FederateSet::new(vec![4, 2, 3, 1]).unwrap();
    assert_eq!(set.ids(), &[4, 2, 3, 1]);
    assert_eq!(set.index_of(3), Some(2));
    assert!(set.contains(1));
    assert!(!set.contains(9));
}

#[test]
fn test_first_non_spoofer_policy_skips_spoofers() {
    let mut builder = ScenarioBuilder::new("policy", 1);
    builder
        .receiver(1, Position::new(0.0, 0.0, 0.0), HostType::Benign)
        .receiver(2, Position::new(100.0, 0.0, 0.0), HostType::Spoofer)
        .receiver(3, Position::new(0.0, 100.0, 0.0), HostType::Federate)
        .receiver(4, Position::new(100.0, 100.0, 0.0), HostType::Benign)
        .receiver(5, Position::new(50.0, 50.0, 0.0), HostType::Benign)
        .receiver(6, Position::new(70.0, 20.0, 0.0), HostType::Benign);
    builder.broadcast(Broadcast::honest(100, 0, Position::new(50.0, 50.0, 30.0), 14.0));
    let store = builder.build();

    let set = FederateSet::resolve(&FederatePolicy::FirstNonSpoofer { count: 4 }, &store).unwrap();
    assert_eq!(set.ids(), &[1, 3, 4, 5]);

    let labeled = FederateSet::resolve(&FederatePolicy::Labeled, &store);
    assert!(matches!(labeled, Err(EngineError::Config(_))));

    let explicit =
        FederateSet::resolve(&FederatePolicy::Explicit { ids: vec![6, 5, 4, 1] }, &store).unwrap();
    assert_eq!(explicit.ids(), &[6, 5, 4, 1]);
}

#[test]
fn test_first_non_spoofer_policy_needs_enough_hosts() {
    let mut builder = ScenarioBuilder::new("few", 1);
    builder
        .receiver(1, Position::new(0.0, 0.0, 0.0), HostType::Benign)
        .receiver(2, Position::new(100.0, 0.0, 0.0), HostType::Benign);
    let store = builder.build();
    let result = FederateSet::resolve(&FederatePolicy::FirstNonSpoofer { count: 4 }, &store);
    assert!(matches!(result, Err(EngineError::Config(_))));
}

// ---- Files ----

#[test]
fn test_csv_round_trip_through_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let mut builder = ScenarioBuilder::new("rt", 11).with_rssi_noise(1.0).unwrap();
    square_receivers(&mut builder, HostType::Federate);
    builder.track(Track {
        serial_number: 100,
        start: Position::new(20.0, 30.0, 40.0),
        velocity: DVec3::new(1.0, 2.0, 0.0),
        tx_power_dbm: 14.0,
        start_ms: 0,
        period_ms: 1000,
        count: 4,
        spoof_offset: None,
    });
    let path = dir.path().join("scenario_a.csv");
    builder.write_csv(&path).unwrap();

    let expected = builder.build();
    let loaded = EventStore::load(&path).unwrap();
    assert_eq!(loaded.scenario_id(), "scenario_a.csv");
    assert_eq!(loaded.events(), expected.events());
    assert_eq!(loaded.stats().tx_rows, 4);
    assert_eq!(loaded.hosts().get(&1), Some(&HostType::Federate));
    assert_eq!(loaded.hosts().get(&100), Some(&HostType::Benign));
}

#[test]
fn test_dataset_sorted_and_limited() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["c.csv", "a.csv", "b.csv"] {
        let mut builder = ScenarioBuilder::new(name, 1);
        square_receivers(&mut builder, HostType::Benign);
        builder.broadcast(Broadcast::honest(100, 0, Position::new(10.0, 10.0, 10.0), 14.0));
        builder.write_csv(&dir.path().join(name)).unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let paths = list_scenarios(dir.path(), Some(2)).unwrap();
    let names: Vec<_> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["a.csv", "b.csv"]);

    let stores = load_dataset(dir.path(), None).unwrap();
    let ids: Vec<_> = stores.iter().map(|s| s.scenario_id().to_string()).collect();
    assert_eq!(ids, vec!["a.csv", "b.csv", "c.csv"]);
}

#[test]
fn test_dataset_missing_dir_is_io_error() {
    let result = load_dataset(Path::new("/nonexistent/ridwatch"), None);
    assert!(matches!(result, Err(EngineError::Io { .. })));
}
