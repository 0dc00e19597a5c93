//! Error types for the transactional engine.
//!
//! Mirrors the error taxonomy of §7 of the design: one variant per failure
//! mode the core can return, plus the ambient I/O and protocol errors the
//! outer command dispatcher surfaces. Uses `thiserror` for the `Display`
//! impls, following the rest of the codebase this crate was grounded on.

use thiserror::Error;

use crate::common::TransactionId;

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors returned by the transactional core, plus the dispatcher's own.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The transaction slot table is exhausted; no more transactions can begin.
    #[error("transaction slot table exhausted (max_txns reached)")]
    Overload,

    /// The transaction was selected as a deadlock victim, explicitly aborted,
    /// or its write-set overflowed.
    #[error("transaction {0} is aborted")]
    Aborted(TransactionId),

    /// `get` found the key in neither the write-set nor the committed map.
    #[error("key not found")]
    NotFound,

    /// `put` would exceed the per-transaction write-set capacity.
    #[error("transaction {0} write-set is full (max_writes reached)")]
    WritesetFull(TransactionId),

    /// Malformed input, e.g. an empty or over-length key or value.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// The transaction id does not refer to a currently active transaction.
    #[error("transaction {0} is not active")]
    NoSuchTransaction(TransactionId),

    // -- Ambient errors (outer dispatcher only; never returned by the core) --
    /// Socket or other I/O failure in the external session layer.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A request line could not be parsed into a known command.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl EngineError {
    /// Short machine-readable tag used in the wire protocol (`ERR <tag>`).
    pub fn wire_tag(&self) -> &'static str {
        match self {
            EngineError::Overload => "OVERLOAD",
            EngineError::Aborted(_) => "ABORTED",
            EngineError::NotFound => "NOT_FOUND",
            EngineError::WritesetFull(_) => "WRITESET_FULL",
            EngineError::Invalid(_) => "INVALID",
            EngineError::NoSuchTransaction(_) => "INVALID",
            EngineError::Io(_) => "IO",
            EngineError::Protocol(_) => "INVALID",
        }
    }
}
