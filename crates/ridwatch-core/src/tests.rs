//! Tests for core vocabulary: ordering, parsing, tallies, and config validation.

use crate::config::*;
use crate::enums::*;
use crate::error::EngineError;
use crate::records::{ScoreTally, SkipReason};
use crate::types::{Position, TransmissionKey};

// ---- Types ----

#[test]
fn test_transmission_key_orders_by_timestamp_then_serial() {
    let mut keys = vec![
        TransmissionKey::new(7, 2000),
        TransmissionKey::new(3, 2000),
        TransmissionKey::new(9, 1000),
    ];
    keys.sort();
    assert_eq!(
        keys,
        vec![
            TransmissionKey::new(9, 1000),
            TransmissionKey::new(3, 2000),
            TransmissionKey::new(7, 2000),
        ]
    );
}

#[test]
fn test_position_range() {
    let a = Position::new(0.0, 0.0, 0.0);
    let b = Position::new(3.0, 4.0, 12.0);
    assert!((a.range_to(&b) - 13.0).abs() < 1e-12);
    assert!(!Position::new(f64::NAN, 0.0, 0.0).is_finite());
}

// ---- Enums ----

#[test]
fn test_host_type_parse() {
    assert_eq!(HostType::parse("benign"), HostType::Benign);
    assert_eq!(HostType::parse("Spoofer"), HostType::Spoofer);
    assert_eq!(HostType::parse(" federate "), HostType::Federate);
    assert_eq!(HostType::parse(""), HostType::Unknown);
    assert!(!HostType::Federate.is_spoofer());
}

#[test]
fn test_event_type_parse() {
    assert_eq!(EventType::parse("TX"), Some(EventType::Tx));
    assert_eq!(EventType::parse("RX"), Some(EventType::Rx));
    assert_eq!(EventType::parse("ACK"), None);
}

#[test]
fn test_detector_kind_names() {
    for kind in [
        DetectorKind::KalmanPower,
        DetectorKind::Multilateration,
        DetectorKind::SingleSample,
        DetectorKind::External,
    ] {
        assert_eq!(DetectorKind::parse(kind.short_name()), Some(kind));
    }
}

// ---- Records ----

#[test]
fn test_tally_merge() {
    let mut a = ScoreTally::default();
    a.scored = 3;
    a.skip(SkipReason::Bootstrap);
    let mut b = ScoreTally::default();
    b.scored = 2;
    b.skip(SkipReason::Bootstrap);
    b.skip(SkipReason::NonConvergence);
    a.merge(&b);
    assert_eq!(a.scored, 5);
    assert_eq!(a.skipped_for(SkipReason::Bootstrap), 2);
    assert_eq!(a.skipped_total(), 3);
}

// ---- Config ----

#[test]
fn test_default_config_is_valid() {
    EvaluationConfig::default().validate().unwrap();
}

#[test]
fn test_small_federate_set_rejected() {
    let config = EvaluationConfig {
        federates: FederatePolicy::FirstNonSpoofer { count: 3 },
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(EngineError::Config(_))));

    let explicit = FederatePolicy::Explicit {
        ids: vec![1, 2, 3],
    };
    assert!(explicit.validate().is_err());
}

#[test]
fn test_non_positive_noise_rejected() {
    let mut config = EvaluationConfig::default();
    config.kalman_power.noise.measurement_noise = 0.0;
    assert!(config.validate().is_err());

    let mut config = EvaluationConfig::default();
    config.multilateration.noise.process_noise = -1.0;
    assert!(config.validate().is_err());
}

#[test]
fn test_empty_candidates_rejected() {
    let config = EvaluationConfig {
        path_loss_candidates: Vec::new(),
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_partial_json_keeps_defaults() {
    let json = r#"{
        "federates": { "policy": "explicit", "ids": [4, 1, 2, 3] },
        "multilateration": { "path_loss_exponent": 2.4 },
        "transmission_level": true
    }"#;
    let config: EvaluationConfig = serde_json::from_str(json).unwrap();
    assert_eq!(
        config.federates,
        FederatePolicy::Explicit {
            ids: vec![4, 1, 2, 3]
        }
    );
    assert_eq!(config.multilateration.path_loss_exponent, 2.4);
    assert_eq!(
        config.multilateration.noise.measurement_noise,
        crate::constants::MLAT_KF_MEASUREMENT_NOISE
    );
    assert_eq!(config.kalman_power, PowerDetectorConfig::default());
    assert!(config.transmission_level);
    config.validate().unwrap();
}

#[test]
fn test_partial_error_filter_noise_keeps_its_defaults() {
    let json = r#"{ "multilateration": { "noise": { "process_noise": 50.0 } } }"#;
    let config: EvaluationConfig = serde_json::from_str(json).unwrap();
    let noise = config.multilateration.noise;
    assert_eq!(noise.process_noise, 50.0);
    assert_eq!(
        noise.measurement_noise,
        crate::constants::MLAT_KF_MEASUREMENT_NOISE
    );
    assert_eq!(noise.initial_variance, crate::constants::MLAT_KF_INITIAL_VARIANCE);
}
