//! Core types and definitions for the ridwatch spoofing-detection engine.
//!
//! This crate defines the vocabulary shared across all other crates:
//! geometry, reception events, detection records, configuration, errors,
//! and the free-space path-loss model. It performs no I/O.

pub mod config;
pub mod constants;
pub mod enums;
pub mod error;
pub mod events;
pub mod path_loss;
pub mod records;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use path_loss::PathLossModel;

#[cfg(test)]
mod tests;
