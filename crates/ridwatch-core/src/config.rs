//! Detector and evaluation configuration.
//!
//! Every struct has a `Default` carrying the values in
//! [`constants`](crate::constants) and deserializes with `#[serde(default)]`,
//! so a JSON file only needs to name what it overrides. `validate()` is
//! called once when a pipeline is built; nothing is scored with an invalid
//! configuration.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::*;
use crate::enums::{ErrorScoreMode, FilterScope};
use crate::error::{EngineError, EngineResult};
use crate::path_loss::PathLossModel;
use crate::types::ReceiverId;

/// Noise parameters of a scalar Kalman filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanNoise {
    /// Process noise Q added to the variance on every predict.
    pub process_noise: f64,
    /// Measurement noise R.
    pub measurement_noise: f64,
    /// Variance P assigned when the filter is initialized.
    pub initial_variance: f64,
    /// Start from this prior estimate instead of the first measurement.
    pub initial_estimate: Option<f64>,
}

impl Default for KalmanNoise {
    fn default() -> Self {
        Self {
            process_noise: POWER_KF_PROCESS_NOISE,
            measurement_noise: POWER_KF_MEASUREMENT_NOISE,
            initial_variance: POWER_KF_INITIAL_VARIANCE,
            initial_estimate: None,
        }
    }
}

impl KalmanNoise {
    pub fn validate(&self, owner: &str) -> EngineResult<()> {
        positive(owner, "process_noise", self.process_noise)?;
        positive(owner, "measurement_noise", self.measurement_noise)?;
        positive(owner, "initial_variance", self.initial_variance)?;
        if let Some(x0) = self.initial_estimate {
            finite(owner, "initial_estimate", x0)?;
        }
        Ok(())
    }
}

/// Kalman transmit-power detector settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerDetectorConfig {
    pub path_loss_exponent: f64,
    pub carrier_mhz: f64,
    pub noise: KalmanNoise,
    pub scope: FilterScope,
}

impl Default for PowerDetectorConfig {
    fn default() -> Self {
        Self {
            path_loss_exponent: FREE_SPACE_PATH_LOSS_EXPONENT,
            carrier_mhz: CARRIER_FREQUENCY_MHZ,
            noise: KalmanNoise::default(),
            scope: FilterScope::default(),
        }
    }
}

impl PowerDetectorConfig {
    pub fn path_loss(&self) -> PathLossModel {
        PathLossModel::new(self.path_loss_exponent, self.carrier_mhz)
    }

    pub fn validate(&self) -> EngineResult<()> {
        positive("kalman_power", "path_loss_exponent", self.path_loss_exponent)?;
        positive("kalman_power", "carrier_mhz", self.carrier_mhz)?;
        self.noise.validate("kalman_power.noise")
    }
}

/// Levenberg–Marquardt solver settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub ftol: f64,
    pub xtol: f64,
    /// Evaluation cap is `patience * (unknowns + 1)`.
    pub patience: usize,
    pub tx_power_min_dbm: f64,
    pub tx_power_max_dbm: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            ftol: SOLVER_FTOL,
            xtol: SOLVER_XTOL,
            patience: SOLVER_PATIENCE,
            tx_power_min_dbm: MLAT_TX_POWER_MIN_DBM,
            tx_power_max_dbm: MLAT_TX_POWER_MAX_DBM,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> EngineResult<()> {
        positive("solver", "ftol", self.ftol)?;
        positive("solver", "xtol", self.xtol)?;
        if self.patience == 0 {
            return Err(EngineError::config("solver.patience must be at least 1"));
        }
        if !(self.tx_power_min_dbm < self.tx_power_max_dbm) {
            return Err(EngineError::config(format!(
                "solver tx power bounds are empty: [{}, {}]",
                self.tx_power_min_dbm, self.tx_power_max_dbm
            )));
        }
        Ok(())
    }
}

/// Multilateration detector settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultilaterationConfig {
    /// Fixed during scoring; chosen by line search during training.
    pub path_loss_exponent: f64,
    pub carrier_mhz: f64,
    /// Fields omitted from a `noise` override keep the error-filter defaults.
    #[serde(deserialize_with = "error_filter_noise")]
    pub noise: KalmanNoise,
    pub solver: SolverConfig,
    pub score_mode: ErrorScoreMode,
}

impl Default for MultilaterationConfig {
    fn default() -> Self {
        Self {
            path_loss_exponent: FREE_SPACE_PATH_LOSS_EXPONENT,
            carrier_mhz: CARRIER_FREQUENCY_MHZ,
            noise: KalmanNoise {
                process_noise: MLAT_KF_PROCESS_NOISE,
                measurement_noise: MLAT_KF_MEASUREMENT_NOISE,
                initial_variance: MLAT_KF_INITIAL_VARIANCE,
                initial_estimate: None,
            },
            solver: SolverConfig::default(),
            score_mode: ErrorScoreMode::default(),
        }
    }
}

impl MultilaterationConfig {
    pub fn path_loss(&self) -> PathLossModel {
        PathLossModel::new(self.path_loss_exponent, self.carrier_mhz)
    }

    pub fn with_path_loss_exponent(mut self, exponent: f64) -> Self {
        self.path_loss_exponent = exponent;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        positive("multilateration", "path_loss_exponent", self.path_loss_exponent)?;
        positive("multilateration", "carrier_mhz", self.carrier_mhz)?;
        self.noise.validate("multilateration.noise")?;
        self.solver.validate()
    }
}

/// Partial [`KalmanNoise`] as read from a config file.
#[derive(Deserialize)]
struct NoiseOverride {
    process_noise: Option<f64>,
    measurement_noise: Option<f64>,
    initial_variance: Option<f64>,
    initial_estimate: Option<f64>,
}

impl NoiseOverride {
    fn over(self, base: KalmanNoise) -> KalmanNoise {
        KalmanNoise {
            process_noise: self.process_noise.unwrap_or(base.process_noise),
            measurement_noise: self.measurement_noise.unwrap_or(base.measurement_noise),
            initial_variance: self.initial_variance.unwrap_or(base.initial_variance),
            initial_estimate: self.initial_estimate.or(base.initial_estimate),
        }
    }
}

fn error_filter_noise<'de, D: Deserializer<'de>>(deserializer: D) -> Result<KalmanNoise, D::Error> {
    let base = MultilaterationConfig::default().noise;
    Ok(NoiseOverride::deserialize(deserializer)?.over(base))
}

/// Reference-sample detector settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleSampleConfig {
    pub path_loss_exponent: f64,
    pub carrier_mhz: f64,
    /// Deviation (dB) logged as a potential spoof.
    pub alarm_db: f64,
}

impl Default for SingleSampleConfig {
    fn default() -> Self {
        Self {
            path_loss_exponent: FREE_SPACE_PATH_LOSS_EXPONENT,
            carrier_mhz: CARRIER_FREQUENCY_MHZ,
            alarm_db: SINGLE_SAMPLE_ALARM_DB,
        }
    }
}

impl SingleSampleConfig {
    pub fn path_loss(&self) -> PathLossModel {
        PathLossModel::new(self.path_loss_exponent, self.carrier_mhz)
    }

    pub fn validate(&self) -> EngineResult<()> {
        positive("single_sample", "path_loss_exponent", self.path_loss_exponent)?;
        positive("single_sample", "carrier_mhz", self.carrier_mhz)?;
        positive("single_sample", "alarm_db", self.alarm_db)
    }
}

/// How the multilateration federate set is chosen for a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum FederatePolicy {
    /// The first `count` non-spoofer hosts by ascending id.
    FirstNonSpoofer { count: usize },
    /// Hosts labelled `federate` in the event log.
    Labeled,
    /// A fixed, ordered list of receiver ids.
    Explicit { ids: Vec<ReceiverId> },
}

impl Default for FederatePolicy {
    fn default() -> Self {
        FederatePolicy::FirstNonSpoofer {
            count: DEFAULT_FEDERATE_COUNT,
        }
    }
}

impl FederatePolicy {
    /// Reject policies that can never yield a solvable federate set.
    pub fn validate(&self) -> EngineResult<()> {
        let size = match self {
            FederatePolicy::FirstNonSpoofer { count } => *count,
            FederatePolicy::Explicit { ids } => ids.len(),
            // Size is only known per scenario; checked when the set is resolved.
            FederatePolicy::Labeled => return Ok(()),
        };
        if size < MLAT_MIN_FEDERATES {
            return Err(EngineError::config(format!(
                "federate set of {size} receivers is too small; multilateration needs at least {MLAT_MIN_FEDERATES}"
            )));
        }
        Ok(())
    }
}

/// Everything an evaluation run needs besides its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub federates: FederatePolicy,
    pub kalman_power: PowerDetectorConfig,
    pub multilateration: MultilaterationConfig,
    pub single_sample: SingleSampleConfig,
    /// Path-loss exponents tried for multilateration on the training split.
    pub path_loss_candidates: Vec<f64>,
    /// Aggregate per-event scores to one score per transmission
    /// (max over federate receivers) before optimizing.
    pub transmission_level: bool,
    pub train_limit: Option<usize>,
    pub test_limit: Option<usize>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            federates: FederatePolicy::default(),
            kalman_power: PowerDetectorConfig::default(),
            multilateration: MultilaterationConfig::default(),
            single_sample: SingleSampleConfig::default(),
            path_loss_candidates: PATH_LOSS_CANDIDATES.to_vec(),
            transmission_level: false,
            train_limit: None,
            test_limit: None,
        }
    }
}

impl EvaluationConfig {
    /// Load a JSON config; omitted fields keep their defaults.
    pub fn from_json_file(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.federates.validate()?;
        self.kalman_power.validate()?;
        self.multilateration.validate()?;
        self.single_sample.validate()?;
        if self.path_loss_candidates.is_empty() {
            return Err(EngineError::config("path_loss_candidates is empty"));
        }
        for &n in &self.path_loss_candidates {
            positive("path_loss_candidates", "exponent", n)?;
        }
        Ok(())
    }
}

fn positive(owner: &str, field: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::config(format!(
            "{owner}.{field} must be positive and finite, got {value}"
        )))
    }
}

fn finite(owner: &str, field: &str, value: f64) -> EngineResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::config(format!(
            "{owner}.{field} must be finite, got {value}"
        )))
    }
}
