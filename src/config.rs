//! Engine configuration.
//!
//! Follows the teacher codebase's `Config`/`DatabaseConfig` pattern: a plain
//! struct with a `Default` impl carrying the stock values, overridable field
//! by field or via the `with_*` builder methods before constructing an
//! [`crate::Engine`].

use std::time::Duration;

/// Runtime-tunable limits and knobs for the engine.
///
/// The defaults match the compile-time constants of §6: `N_SLOTS` (128),
/// `MAX_TXNS` (32), `MAX_WRITES` (64), `KEY_LEN` (64), `VALUE_LEN` (4096),
/// and the 200ms wait-poll interval used by the lock-acquisition protocol.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of key-lock slots the key space is hashed into.
    pub n_slots: usize,
    /// Maximum number of concurrently active transactions.
    pub max_txns: usize,
    /// Maximum number of buffered writes per transaction before `WRITESET_FULL`.
    pub max_writes: usize,
    /// Maximum key length in bytes.
    pub key_len: usize,
    /// Maximum value length in bytes.
    pub value_len: usize,
    /// Bound on how long a waiter parks before re-checking its abort flag.
    pub wait_poll_interval: Duration,
    /// Unix-domain-socket path used by the external session acceptor.
    pub socket_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            n_slots: 128,
            max_txns: 32,
            max_writes: 64,
            key_len: 64,
            value_len: 4096,
            wait_poll_interval: Duration::from_millis(200),
            socket_path: "/tmp/kvtxn.sock".to_string(),
        }
    }
}

impl EngineConfig {
    /// Overrides the number of lock-table slots.
    pub fn with_n_slots(mut self, n_slots: usize) -> Self {
        self.n_slots = n_slots;
        self
    }

    /// Overrides the maximum number of concurrent transactions.
    pub fn with_max_txns(mut self, max_txns: usize) -> Self {
        self.max_txns = max_txns;
        self
    }

    /// Overrides the per-transaction write-set capacity.
    pub fn with_max_writes(mut self, max_writes: usize) -> Self {
        self.max_writes = max_writes;
        self
    }

    /// Overrides the wait-poll interval used while parked on a slot condition.
    pub fn with_wait_poll_interval(mut self, interval: Duration) -> Self {
        self.wait_poll_interval = interval;
        self
    }

    /// Overrides the Unix-domain-socket path used by the server binary.
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = path.into();
        self
    }
}
