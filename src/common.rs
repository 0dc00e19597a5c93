//! Shared type aliases used across the engine.
//!
//! Kept separate from [`crate::engine`] so that every submodule can depend
//! on these identifiers without creating a cycle back through the facade.

/// Unique identifier for a transaction; a stable slot index in `[0, MAX_TXNS)`
/// for the lifetime of the transaction.
pub type TransactionId = usize;

/// Index of a key-lock slot in `[0, N_SLOTS)`.
pub type SlotId = usize;

/// Monotonically increasing sequence assigned at `begin`; larger = younger.
pub type StartSeq = u64;
