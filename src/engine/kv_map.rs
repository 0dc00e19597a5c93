//! The committed key-value map.
//!
//! The only authoritative state in the engine: every committed transaction's
//! writes land here, and every `get` that misses the caller's write-set reads
//! from here. Guarded by a single mutex; `read`/`write` are each linearizable
//! but there is no ordering imposed across distinct keys.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Thread-safe mapping from key to current committed value.
pub struct KvMap {
    inner: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl KvMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a copy of the committed value for `key`, or `None` if absent.
    pub fn read(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.lock().get(key).cloned()
    }

    /// Inserts or replaces the value for `key`.
    pub fn write(&self, key: Vec<u8>, value: Vec<u8>) {
        self.inner.lock().insert(key, value);
    }

    /// Number of keys currently present. Exposed for diagnostics and tests.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the map holds no keys.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for KvMap {
    fn default() -> Self {
        Self::new()
    }
}
