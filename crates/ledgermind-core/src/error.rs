//! Error types for the LedgerMind tool engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or inconsistent ledger input. Fatal to snapshot construction;
    /// a ledger is never partially accepted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Trailing history is too short to support the requested computation.
    /// Recoverable: the caller may retry with a wider lookback.
    #[error("Insufficient history: {available_days} days available, {required_days} required")]
    InsufficientHistory {
        required_days: i64,
        available_days: i64,
    },

    /// Malformed tool request (unknown tool kind, parameters failing schema
    /// validation). Surfaced to the caller as a structured failure.
    #[error("Request error: {0}")]
    Request(String),

    /// Unexpected numeric or invariant violation. Always fatal; always logged
    /// with the snapshot fingerprint so the failure is reproducible.
    #[error("Internal computation error for snapshot {fingerprint}: {detail}")]
    Internal { fingerprint: String, detail: String },
}

impl Error {
    /// Stable machine-readable kind, used in tool failure payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::InsufficientHistory { .. } => "insufficient_history",
            Error::Request(_) => "request",
            Error::Internal { .. } => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
