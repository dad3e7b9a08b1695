//! Event storage for ridwatch.
//!
//! Reads exported reception logs, indexes reception events by transmitter
//! and by transmission, resolves federate receiver sets, and builds
//! synthetic scenarios for tests and demos.

pub mod dataset;
pub mod federate;
pub mod reader;
pub mod store;
pub mod synthetic;

pub use federate::FederateSet;
pub use store::{EventStore, Transmission};

#[cfg(test)]
mod tests;
