//! RSSI multilateration detector.
//!
//! For every transmission heard by the whole federate set, solve jointly for
//! the transmitter's position and power, measure the distance to the claimed
//! position, and smooth that error with a per-transmitter Kalman filter.

mod detector;
pub mod solver;

pub use detector::MultilaterationDetector;
pub use solver::{MlatSolution, MultilaterationSolver, RssiObservation};
