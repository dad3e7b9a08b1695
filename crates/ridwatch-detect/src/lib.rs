//! Spoofing detectors for ridwatch.
//!
//! Every detector implements [`Detector`]: it consumes one scenario's
//! [`EventStore`](ridwatch_store::EventStore) and returns a [`ScoreSet`] of
//! detection records plus a tally of what it could not score.

pub mod detector;
pub mod external;
pub mod kalman;
pub mod mlat;
pub mod power;
pub mod single_sample;

pub use detector::{Detector, Outcome, ScoreSet};
pub use external::{ExternalScoreDetector, ExternalScores};
pub use kalman::{FilterBank, FilterStep, KalmanUpdate, ScalarKalmanFilter};
pub use mlat::{MultilaterationDetector, MultilaterationSolver};
pub use power::KalmanPowerDetector;
pub use single_sample::SingleSampleDetector;

#[cfg(test)]
mod tests;
