//! Tests for the power, reference-sample, multilateration, and external detectors.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use glam::DVec3;

use ridwatch_core::config::{MultilaterationConfig, PowerDetectorConfig, SingleSampleConfig, SolverConfig};
use ridwatch_core::constants::NIS_CHI2_99;
use ridwatch_core::enums::{ErrorScoreMode, FilterScope, HostType};
use ridwatch_core::error::EngineError;
use ridwatch_core::path_loss::PathLossModel;
use ridwatch_core::records::{RecordKey, SkipReason};
use ridwatch_core::types::{Position, TransmissionKey};
use ridwatch_store::synthetic::{Broadcast, ScenarioBuilder, Track};
use ridwatch_store::{EventStore, FederateSet};

use crate::detector::{Detector, Outcome};
use crate::external::{ExternalScoreDetector, ExternalScores};
use crate::mlat::{MultilaterationDetector, MultilaterationSolver, RssiObservation};
use crate::power::KalmanPowerDetector;
use crate::single_sample::SingleSampleDetector;

const SERIAL: u32 = 100;

fn triangle_builder() -> ScenarioBuilder {
    let mut b = ScenarioBuilder::new("triangle", 1);
    b.receiver(1, Position::new(0.0, 0.0, 0.0), HostType::Benign)
        .receiver(2, Position::new(100.0, 0.0, 0.0), HostType::Benign)
        .receiver(3, Position::new(0.0, 100.0, 0.0), HostType::Benign);
    b
}

/// Five receivers, not coplanar.
fn federate_builder() -> ScenarioBuilder {
    let mut b = ScenarioBuilder::new("federates", 1);
    b.receiver(1, Position::new(0.0, 0.0, 0.0), HostType::Federate)
        .receiver(2, Position::new(300.0, 0.0, 20.0), HostType::Federate)
        .receiver(3, Position::new(0.0, 300.0, 40.0), HostType::Federate)
        .receiver(4, Position::new(300.0, 300.0, 5.0), HostType::Federate)
        .receiver(5, Position::new(150.0, 150.0, 80.0), HostType::Federate);
    b
}

fn federates() -> FederateSet {
    FederateSet::new(vec![1, 2, 3, 4, 5]).unwrap()
}

fn hover(serial_number: u32, pos: Position, count: usize, spoof_offset: Option<DVec3>) -> Track {
    Track {
        serial_number,
        start: pos,
        velocity: DVec3::ZERO,
        tx_power_dbm: 14.0,
        start_ms: 0,
        period_ms: 1000,
        count,
        spoof_offset,
    }
}

fn mlat(store: &EventStore) -> crate::detector::ScoreSet {
    MultilaterationDetector::new(MultilaterationConfig::default(), federates())
        .unwrap()
        .score(store)
        .unwrap()
}

// ---- Kalman power detector ----

#[test]
fn test_power_honest_then_spoofed_reception() {
    let honest = Position::new(50.0, 50.0, 10.0);
    let mut builder = triangle_builder();
    for i in 0..5 {
        builder.broadcast(Broadcast::honest(SERIAL, i * 1000, honest, 14.0));
    }
    builder.broadcast_to(
        Broadcast::spoofed(SERIAL, 5000, Position::new(500.0, 500.0, 10.0), honest, 14.0),
        &[1],
    );
    let store = builder.build();

    let mut detector = KalmanPowerDetector::new(PowerDetectorConfig::default());
    let set = detector.score(&store).unwrap();

    assert_eq!(set.tally.skipped_for(SkipReason::Bootstrap), 1);
    assert_eq!(set.records.len(), store.len() - 1);
    for record in set.records.iter().filter(|r| !r.label) {
        assert!(record.score < 1.0, "honest NIS {}", record.score);
    }
    let spoofed: Vec<_> = set.records.iter().filter(|r| r.label).collect();
    assert_eq!(spoofed.len(), 1);
    assert!(spoofed[0].score > NIS_CHI2_99, "spoofed NIS {}", spoofed[0].score);
    assert_eq!(detector.alarms(), 1);
}

#[test]
fn test_power_steady_state_nis_near_zero() {
    let mut builder = triangle_builder();
    builder.track(Track {
        velocity: DVec3::new(3.0, -2.0, 0.5),
        ..hover(SERIAL, Position::new(20.0, 80.0, 30.0), 30, None)
    });
    let store = builder.build();
    let set = KalmanPowerDetector::new(PowerDetectorConfig::default())
        .score(&store)
        .unwrap();
    assert!(set.records.iter().all(|r| r.score < 1e-9));
}

#[test]
fn test_power_per_link_scope_bootstraps_each_link() {
    let mut builder = triangle_builder();
    builder.track(hover(SERIAL, Position::new(50.0, 50.0, 10.0), 4, None));
    let store = builder.build();
    let config = PowerDetectorConfig {
        scope: FilterScope::PerLink,
        ..Default::default()
    };
    let set = KalmanPowerDetector::new(config).score(&store).unwrap();
    assert_eq!(set.tally.skipped_for(SkipReason::Bootstrap), 3);
    assert_eq!(set.tally.scored, 9);
}

#[test]
fn test_power_out_of_order_is_error() {
    let mut builder = triangle_builder();
    builder.track(hover(SERIAL, Position::new(50.0, 50.0, 10.0), 2, None));
    let store = builder.build();
    let events = store.events();
    let last = events.len() - 1;

    let mut detector = KalmanPowerDetector::new(PowerDetectorConfig::default());
    assert!(matches!(
        detector.score_event(&events[last]).unwrap(),
        Outcome::Skipped(SkipReason::Bootstrap)
    ));
    let err = detector.score_event(&events[0]).unwrap_err();
    assert!(matches!(err, EngineError::OutOfOrder { .. }));
}

#[test]
fn test_power_scores_reset_between_scenarios() {
    let mut builder = triangle_builder();
    builder.track(hover(SERIAL, Position::new(50.0, 50.0, 10.0), 3, None));
    let store = builder.build();
    let mut detector = KalmanPowerDetector::new(PowerDetectorConfig::default());
    let first = detector.score(&store).unwrap();
    let second = detector.score(&store).unwrap();
    assert_eq!(first, second);
}

// ---- Reference-sample detector ----

#[test]
fn test_single_sample_flags_displaced_transmitter() {
    let honest = Position::new(50.0, 50.0, 10.0);
    let mut builder = triangle_builder();
    builder.broadcast(Broadcast::honest(SERIAL, 0, honest, 14.0));
    builder.broadcast(Broadcast::honest(SERIAL, 1000, honest, 14.0));
    builder.broadcast(Broadcast::spoofed(
        SERIAL,
        2000,
        Position::new(500.0, 500.0, 10.0),
        honest,
        14.0,
    ));
    let store = builder.build();

    let mut detector = SingleSampleDetector::new(SingleSampleConfig::default());
    let set = detector.score(&store).unwrap();
    assert_eq!(set.tally.skipped_for(SkipReason::Bootstrap), 3);
    for record in &set.records {
        if record.label {
            assert!(record.score > 10.0, "score {}", record.score);
        } else {
            assert!(record.score < 1e-9);
        }
    }
    assert_eq!(detector.alarms(), 3);
}

// ---- Multilateration solver ----

#[test]
fn test_solver_recovers_position_and_power() {
    let model = PathLossModel::default();
    let truth = Position::new(120.0, 170.0, 50.0);
    let receivers = [
        Position::new(0.0, 0.0, 0.0),
        Position::new(300.0, 0.0, 20.0),
        Position::new(0.0, 300.0, 40.0),
        Position::new(300.0, 300.0, 5.0),
        Position::new(150.0, 150.0, 80.0),
    ];
    let observations: Vec<RssiObservation> = receivers
        .iter()
        .map(|r| RssiObservation {
            receiver_pos: *r,
            rssi_dbm: model.rx_power_dbm(14.0, r.range_to(&truth)),
        })
        .collect();

    let solver = MultilaterationSolver::new(model, SolverConfig::default());
    let solution = solver.solve(&observations, 50.0, None).unwrap();
    assert!(
        solution.position.range_to(&truth) < 1e-3,
        "position {:?}",
        solution.position
    );
    assert!((solution.tx_power_dbm - 14.0).abs() < 1e-3);
}

fn noiseless(model: PathLossModel, receivers: &[Position], truth: Position, tx_dbm: f64) -> Vec<RssiObservation> {
    receivers
        .iter()
        .map(|r| RssiObservation {
            receiver_pos: *r,
            rssi_dbm: model.rx_power_dbm(tx_dbm, r.range_to(&truth)),
        })
        .collect()
}

/// Receiver layout written by `rid-eval synthetic`.
const DEMO_FEDERATES: [Position; 4] = [
    Position { x: 0.0, y: 0.0, z: 2.0 },
    Position { x: 500.0, y: 0.0, z: 15.0 },
    Position { x: 0.0, y: 500.0, z: 30.0 },
    Position { x: 500.0, y: 500.0, z: 60.0 },
];

#[test]
fn test_solver_four_federates_recovers_truth() {
    let model = PathLossModel::default();
    let solver = MultilaterationSolver::new(model, SolverConfig::default());
    let coplanar = [
        Position::new(0.0, 0.0, 0.0),
        Position::new(300.0, 0.0, 0.0),
        Position::new(0.0, 300.0, 0.0),
        Position::new(300.0, 300.0, 0.0),
    ];
    let cases = [
        (&DEMO_FEDERATES[..], Position::new(100.0, 150.0, 40.0)),
        (&DEMO_FEDERATES[..], Position::new(400.0, 300.0, 35.0)),
        (&coplanar[..], Position::new(120.0, 170.0, 50.0)),
    ];
    for (receivers, truth) in cases {
        let observations = noiseless(model, receivers, truth, 14.0);
        let solution = solver.solve(&observations, truth.z, Some(truth)).unwrap();
        assert!(
            solution.position.range_to(&truth) < 1e-3,
            "truth {truth:?} solved {:?}",
            solution.position
        );
        assert!((solution.tx_power_dbm - 14.0).abs() < 1e-3);
    }
}

#[test]
fn test_solver_prefers_lower_cost_start() {
    let model = PathLossModel::default();
    let solver = MultilaterationSolver::new(model, SolverConfig::default());
    let truth = Position::new(100.0, 150.0, 40.0);
    let observations = noiseless(model, &DEMO_FEDERATES, truth, 14.0);
    let with_claim = solver.solve(&observations, truth.z, Some(truth)).unwrap();
    let centroid_only = solver.solve(&observations, truth.z, None).unwrap();
    assert!(with_claim.cost <= centroid_only.cost + crate::mlat::solver::COST_TIE);

    // A non-finite claim falls back to the centroid start alone.
    let nan = Position::new(f64::NAN, 0.0, 0.0);
    assert_eq!(solver.solve(&observations, truth.z, Some(nan)), Ok(centroid_only));
}

#[test]
fn test_solver_initial_guess() {
    let model = PathLossModel::default();
    let observations = [
        RssiObservation { receiver_pos: Position::new(0.0, 0.0, 0.0), rssi_dbm: -70.0 },
        RssiObservation { receiver_pos: Position::new(200.0, 0.0, 0.0), rssi_dbm: -50.0 },
        RssiObservation { receiver_pos: Position::new(0.0, 200.0, 0.0), rssi_dbm: -60.0 },
        RssiObservation { receiver_pos: Position::new(200.0, 200.0, 0.0), rssi_dbm: -65.0 },
    ];
    let guess = MultilaterationSolver::new(model, SolverConfig::default()).initial_guess(&observations, 30.0);
    assert_eq!((guess[0], guess[1], guess[2]), (100.0, 100.0, 30.0));
    let strongest_range = Position::new(100.0, 100.0, 30.0).range_to(&Position::new(200.0, 0.0, 0.0));
    assert!((guess[3] - model.tx_power_dbm(-50.0, strongest_range)).abs() < 1e-12);
}

#[test]
fn test_solver_rejects_collinear_receivers() {
    let observations: Vec<RssiObservation> = (0..4)
        .map(|i| RssiObservation {
            receiver_pos: Position::new(100.0 * i as f64, 0.0, 0.0),
            rssi_dbm: -60.0,
        })
        .collect();
    let solver = MultilaterationSolver::new(PathLossModel::default(), SolverConfig::default());
    assert_eq!(solver.solve(&observations, 10.0, None), Err(SkipReason::DegenerateGeometry));
    assert_eq!(solver.solve(&observations[..3], 10.0, None), Err(SkipReason::InsufficientObservations));
}

// ---- Multilateration detector ----

#[test]
fn test_mlat_honest_track_scores_near_zero() {
    let mut builder = federate_builder();
    builder.track(Track {
        velocity: DVec3::new(4.0, 1.0, 0.0),
        ..hover(SERIAL, Position::new(100.0, 120.0, 60.0), 10, None)
    });
    let store = builder.build();
    let set = mlat(&store);
    assert_eq!(set.tally.scored, 10);
    assert!(set.records.iter().all(|r| r.score < 1e-2), "{:?}", set.scores());
    assert!(matches!(set.records[0].key, RecordKey::Transmission(_)));
}

#[test]
fn test_mlat_honest_track_with_four_federates() {
    let mut builder = ScenarioBuilder::new("demo", 7);
    for (i, pos) in DEMO_FEDERATES.iter().enumerate() {
        builder.receiver(i as u32 + 1, *pos, HostType::Federate);
    }
    builder.receiver(5, Position::new(250.0, 250.0, 5.0), HostType::Benign);
    builder.track(Track {
        velocity: DVec3::new(6.0, 2.0, 0.0),
        ..hover(SERIAL, Position::new(100.0, 150.0, 40.0), 60, None)
    });
    let store = builder.build();

    let mut detector = MultilaterationDetector::new(
        MultilaterationConfig::default(),
        FederateSet::new(vec![1, 2, 3, 4]).unwrap(),
    )
    .unwrap();
    let set = detector.score(&store).unwrap();
    assert_eq!(set.tally.scored, 60);
    let worst = set.scores().into_iter().fold(0.0, f64::max);
    assert!(worst < 1e-2, "worst smoothed error {worst}");
}

#[test]
fn test_mlat_score_grows_with_spoof_offset() {
    let mut means = Vec::new();
    for offset in [0.0, 100.0, 300.0, 600.0] {
        let mut builder = federate_builder();
        let spoof = (offset > 0.0).then(|| DVec3::new(offset, 0.0, 0.0));
        builder.track(hover(SERIAL, Position::new(140.0, 160.0, 50.0), 8, spoof));
        let set = mlat(&builder.build());
        assert_eq!(set.tally.scored, 8);
        let scores = set.scores();
        means.push(scores.iter().sum::<f64>() / scores.len() as f64);
    }
    for pair in means.windows(2) {
        assert!(pair[1] > pair[0], "means {means:?}");
    }
}

#[test]
fn test_mlat_skips_transmission_missing_one_federate() {
    let pos = Position::new(140.0, 160.0, 50.0);
    let mut builder = federate_builder();
    builder.broadcast(Broadcast::honest(SERIAL, 0, pos, 14.0));
    builder.broadcast_to(Broadcast::honest(SERIAL, 1000, pos, 14.0), &[1, 2, 3, 4]);
    builder.broadcast(Broadcast::honest(SERIAL, 2000, pos, 14.0));
    let store = builder.build();

    let set = mlat(&store);
    assert_eq!(set.tally.scored, 2);
    assert_eq!(set.tally.skipped_for(SkipReason::InsufficientObservations), 1);
    let keys: Vec<_> = set.records.iter().map(|r| r.key).collect();
    assert_eq!(
        keys,
        vec![
            RecordKey::Transmission(TransmissionKey::new(SERIAL, 0)),
            RecordKey::Transmission(TransmissionKey::new(SERIAL, 2000)),
        ]
    );
}

#[test]
fn test_mlat_degenerate_federates_skip_without_error() {
    let mut builder = ScenarioBuilder::new("line", 1);
    for i in 0..4u32 {
        builder.receiver(i + 1, Position::new(100.0 * i as f64, 0.0, 0.0), HostType::Federate);
    }
    builder.track(hover(SERIAL, Position::new(150.0, 80.0, 40.0), 3, None));
    let store = builder.build();
    let set = MultilaterationDetector::new(
        MultilaterationConfig::default(),
        FederateSet::new(vec![1, 2, 3, 4]).unwrap(),
    )
    .unwrap()
    .score(&store)
    .unwrap();
    assert!(set.records.is_empty());
    assert_eq!(set.tally.skipped_for(SkipReason::DegenerateGeometry), 3);
}

#[test]
fn test_mlat_nis_mode_bootstraps() {
    let mut builder = federate_builder();
    builder.track(hover(SERIAL, Position::new(140.0, 160.0, 50.0), 4, None));
    let config = MultilaterationConfig {
        score_mode: ErrorScoreMode::Nis,
        ..Default::default()
    };
    let set = MultilaterationDetector::new(config, federates())
        .unwrap()
        .score(&builder.build())
        .unwrap();
    assert_eq!(set.tally.skipped_for(SkipReason::Bootstrap), 1);
    assert_eq!(set.tally.scored, 3);
}

#[test]
fn test_mlat_rejects_invalid_config() {
    let mut config = MultilaterationConfig::default();
    config.noise.measurement_noise = 0.0;
    assert!(MultilaterationDetector::new(config, federates()).is_err());
}

// ---- External scores ----

#[test]
fn test_external_scores_match_by_stem() {
    let csv = "filename,serial_number,rid_timestamp,y_proba,is_spoofed\n\
               runs/federates.csv,100,0,0.9,1\n\
               federates,100,1000,0.2,\n";
    let scores = ExternalScores::from_reader(Cursor::new(csv), Path::new("scores.csv")).unwrap();
    assert_eq!(scores.len(), 2);

    let mut builder = federate_builder();
    builder.track(hover(SERIAL, Position::new(140.0, 160.0, 50.0), 3, None));
    let store = builder.build();

    let mut detector = ExternalScoreDetector::new(Arc::new(scores));
    let set = detector.score(&store).unwrap();
    assert_eq!(set.scores(), vec![0.9, 0.2]);
    // Labels always come from the event log.
    assert_eq!(set.labels(), vec![false, false]);
    assert_eq!(set.tally.skipped_for(SkipReason::MissingExternalScore), 1);
}

#[test]
fn test_external_scores_reject_bad_rows() {
    let csv = "filename,serial_number,rid_timestamp,y_proba\nx,abc,0,0.5\n";
    let result = ExternalScores::from_reader(Cursor::new(csv), Path::new("bad.csv"));
    assert!(matches!(result, Err(EngineError::Csv { .. })));
}
