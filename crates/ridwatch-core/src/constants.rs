//! Model constants and tuning defaults.

// --- Radio ---

/// Carrier frequency of the Remote ID broadcast (MHz). Wi-Fi channel 6.
pub const CARRIER_FREQUENCY_MHZ: f64 = 2400.0;

/// Path-loss exponent for unobstructed free space.
pub const FREE_SPACE_PATH_LOSS_EXPONENT: f64 = 2.0;

/// FSPL constant term for distance in km and frequency in MHz (dB).
pub const FSPL_CONSTANT_DB: f64 = 32.44;

/// Distance floor for the path-loss model (meters). Keeps log10 finite.
pub const MIN_DISTANCE_M: f64 = 1e-3;

// --- Kalman power detector ---

/// Process noise for the transmit-power state (dB²).
pub const POWER_KF_PROCESS_NOISE: f64 = 0.01;

/// Measurement noise of the FSPL-implied transmit power (dB²).
pub const POWER_KF_MEASUREMENT_NOISE: f64 = 4.0;

/// Variance assigned when a transmit-power filter is bootstrapped (dB²).
pub const POWER_KF_INITIAL_VARIANCE: f64 = 10.0;

/// 99% chi-square critical value, 1 degree of freedom.
pub const NIS_CHI2_99: f64 = 6.63;

/// Applied Kalman correction above which a sample is suspicious (dB).
pub const POWER_CORRECTION_ALARM_DB: f64 = 6.0;

// --- Multilateration ---

/// Unknowns in the joint solve: x, y, z, transmit power.
pub const MLAT_UNKNOWNS: usize = 4;

/// Minimum federate count accepted for multilateration.
pub const MLAT_MIN_FEDERATES: usize = 4;

/// Default federate count for the first-k-non-spoofer policy.
pub const DEFAULT_FEDERATE_COUNT: usize = 4;

/// Process noise of the position-error filter (m²).
pub const MLAT_KF_PROCESS_NOISE: f64 = 100.0;

/// Measurement noise of the position-error filter (m², ~500 m std dev).
pub const MLAT_KF_MEASUREMENT_NOISE: f64 = 250_000.0;

/// Variance assigned when a position-error filter is bootstrapped (m²).
pub const MLAT_KF_INITIAL_VARIANCE: f64 = 1000.0;

/// Plausible transmit power range for an accepted solution (dBm).
pub const MLAT_TX_POWER_MIN_DBM: f64 = -50.0;
pub const MLAT_TX_POWER_MAX_DBM: f64 = 50.0;

/// Relative reduction tolerance of the least-squares objective.
pub const SOLVER_FTOL: f64 = 1e-8;

/// Relative step tolerance of the least-squares parameters.
pub const SOLVER_XTOL: f64 = 1e-8;

/// Levenberg–Marquardt patience. The solver gives up after
/// `patience * (MLAT_UNKNOWNS + 1)` residual evaluations.
pub const SOLVER_PATIENCE: usize = 100;

/// Candidate path-loss exponents for the training line search.
pub const PATH_LOSS_CANDIDATES: [f64; 8] = [1.6, 1.8, 2.0, 2.2, 2.4, 2.6, 2.8, 3.0];

// --- Single-sample detector ---

/// RSSI deviation from the reference-link prediction that raises an alarm (dB).
pub const SINGLE_SAMPLE_ALARM_DB: f64 = 10.0;
