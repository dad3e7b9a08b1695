//! Fatal engine errors.
//!
//! Recoverable per-item problems (a malformed row, an unsolvable
//! transmission) are not errors; they are tallied as
//! [`DropReason`](crate::records::DropReason) /
//! [`SkipReason`](crate::records::SkipReason) counts.

use std::path::PathBuf;

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {message}")]
    Csv { path: PathBuf, message: String },

    #[error("{path}: missing required column `{column}`")]
    MissingColumn { path: PathBuf, column: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("out-of-order event for filter {filter}: t={current} precedes t={previous}")]
    OutOfOrder {
        filter: String,
        previous: f64,
        current: f64,
    },

    #[error("no detection scores available for {0}")]
    NoScores(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Config(message.into())
    }
}
