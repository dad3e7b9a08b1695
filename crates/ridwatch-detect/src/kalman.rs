//! One-dimensional constant-state Kalman filter.
//!
//! Identity transition, no control input. The same value type backs the
//! transmit-power filter and the position-error filter; [`FilterBank`]
//! keys one filter per transmitter (or link) and enforces time order.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use ridwatch_core::config::KalmanNoise;
use ridwatch_core::error::{EngineError, EngineResult};

/// Result of one measurement update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanUpdate {
    /// `ν = z − x⁻`
    pub innovation: f64,
    /// `S = P⁻ + R`
    pub innovation_variance: f64,
    /// `K = P⁻ / S`
    pub gain: f64,
    /// Applied correction `|Kν|`.
    pub correction: f64,
    /// Normalized innovation squared `ν² / S`, chi-square with 1 dof.
    pub nis: f64,
    /// Posterior state.
    pub estimate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarKalmanFilter {
    x: f64,
    p: f64,
    initialized: bool,
    initial_variance: f64,
}

impl ScalarKalmanFilter {
    /// An uninitialized filter; the first observation becomes the state.
    pub fn new(initial_variance: f64) -> Self {
        Self {
            x: 0.0,
            p: initial_variance,
            initialized: false,
            initial_variance,
        }
    }

    /// A filter starting from a prior estimate.
    pub fn with_prior(estimate: f64, variance: f64) -> Self {
        Self {
            x: estimate,
            p: variance,
            initialized: true,
            initial_variance: variance,
        }
    }

    pub fn from_noise(noise: &KalmanNoise) -> Self {
        match noise.initial_estimate {
            Some(x0) => Self::with_prior(x0, noise.initial_variance),
            None => Self::new(noise.initial_variance),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn estimate(&self) -> f64 {
        self.x
    }

    pub fn variance(&self) -> f64 {
        self.p
    }

    pub fn initialize(&mut self, z: f64) {
        self.x = z;
        self.p = self.initial_variance;
        self.initialized = true;
    }

    /// `P ← P + Q`
    pub fn predict(&mut self, process_noise: f64) {
        self.p += process_noise;
    }

    pub fn update(&mut self, z: f64, measurement_noise: f64) -> KalmanUpdate {
        let innovation = z - self.x;
        let s = self.p + measurement_noise;
        let k = self.p / s;
        self.x += k * innovation;
        self.p *= 1.0 - k;
        KalmanUpdate {
            innovation,
            innovation_variance: s,
            gain: k,
            correction: (k * innovation).abs(),
            nis: innovation * innovation / s,
            estimate: self.x,
        }
    }

    /// Initialize on the first observation, otherwise predict then update.
    pub fn observe(&mut self, z: f64, noise: &KalmanNoise) -> FilterStep {
        if !self.initialized {
            self.initialize(z);
            return FilterStep::Initialized { estimate: self.x };
        }
        self.predict(noise.process_noise);
        FilterStep::Updated(self.update(z, noise.measurement_noise))
    }
}

/// What one observation did to a filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterStep {
    /// First observation; no innovation exists yet.
    Initialized { estimate: f64 },
    Updated(KalmanUpdate),
}

impl FilterStep {
    pub fn estimate(&self) -> f64 {
        match self {
            FilterStep::Initialized { estimate } => *estimate,
            FilterStep::Updated(u) => u.estimate,
        }
    }

    pub fn nis(&self) -> Option<f64> {
        match self {
            FilterStep::Initialized { .. } => None,
            FilterStep::Updated(u) => Some(u.nis),
        }
    }
}

#[derive(Debug, Clone)]
struct TimedFilter {
    filter: ScalarKalmanFilter,
    last_time: f64,
}

/// Lazily created filters keyed by transmitter or link, fed in
/// non-decreasing time order.
#[derive(Debug, Clone)]
pub struct FilterBank<K> {
    noise: KalmanNoise,
    filters: HashMap<K, TimedFilter>,
}

impl<K: Copy + Eq + Hash + Debug> FilterBank<K> {
    pub fn new(noise: KalmanNoise) -> Self {
        Self {
            noise,
            filters: HashMap::new(),
        }
    }

    /// Feed `z` observed at `time` to the filter for `key`.
    /// A time earlier than that filter's last observation is an error and
    /// leaves the filter untouched.
    pub fn observe(&mut self, key: K, time: f64, z: f64) -> EngineResult<FilterStep> {
        let noise = self.noise;
        let entry = self.filters.entry(key).or_insert_with(|| TimedFilter {
            filter: ScalarKalmanFilter::from_noise(&noise),
            last_time: f64::NEG_INFINITY,
        });
        if time < entry.last_time {
            return Err(EngineError::OutOfOrder {
                filter: format!("{key:?}"),
                previous: entry.last_time,
                current: time,
            });
        }
        entry.last_time = time;
        Ok(entry.filter.observe(z, &noise))
    }

    pub fn get(&self, key: &K) -> Option<&ScalarKalmanFilter> {
        self.filters.get(key).map(|f| &f.filter)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }
}
