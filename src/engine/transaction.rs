//! The transaction handle: per-transaction state shared between the owning
//! thread and the deadlock detector (which may set `aborted` from another
//! thread).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::common::{SlotId, StartSeq, TransactionId};

/// A single buffered write, in insertion order; later entries for the same
/// key override earlier ones both on `get` (read-your-writes) and at
/// commit-time flush.
pub type WriteEntry = (Vec<u8>, Vec<u8>);

/// Per-transaction state.
///
/// `aborted` is the only field ever touched by a thread other than the
/// owner (the deadlock detector sets it to mark a victim); everything else
/// is only ever mutated by the transaction's own thread, but is kept behind
/// a lock regardless, both for `Send + Sync` uniformity and so tests can
/// inspect a transaction from outside its owning thread.
pub struct Transaction {
    pub id: TransactionId,
    pub start_seq: StartSeq,
    aborted: AtomicBool,
    held_locks: Mutex<HashSet<SlotId>>,
    write_set: Mutex<Vec<WriteEntry>>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, start_seq: StartSeq) -> Self {
        Self {
            id,
            start_seq,
            aborted: AtomicBool::new(false),
            held_locks: Mutex::new(HashSet::new()),
            write_set: Mutex::new(Vec::new()),
        }
    }

    /// Whether this transaction has been marked aborted, either by a direct
    /// `abort` call or by the deadlock detector selecting it as a victim.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Marks the transaction aborted. Idempotent.
    pub fn mark_aborted(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Records that this transaction now holds the slot (no-op if already
    /// recorded, matching the lock table's own re-entrance).
    pub(crate) fn record_held_lock(&self, slot: SlotId) {
        self.held_locks.lock().insert(slot);
    }

    /// Snapshot of the slots currently believed held, for release-on-commit
    /// and release-on-abort.
    pub(crate) fn held_slots(&self) -> Vec<SlotId> {
        self.held_locks.lock().iter().copied().collect()
    }

    /// Appends a write to the buffer. Returns the new length so the caller
    /// can check it against `max_writes`.
    pub(crate) fn push_write(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let mut ws = self.write_set.lock();
        ws.push((key, value));
        ws.len()
    }

    /// Scans the write-set in reverse for `key`, returning the most
    /// recently buffered value (read-your-writes).
    pub(crate) fn find_write(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.write_set
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| k.as_slice() == key)
            .map(|(_, v)| v.clone())
    }

    /// The buffered writes in insertion order, for flushing at commit.
    pub(crate) fn drain_write_set(&self) -> Vec<WriteEntry> {
        std::mem::take(&mut self.write_set.lock())
    }

    /// Number of buffered writes, for tests and diagnostics.
    pub fn write_set_len(&self) -> usize {
        self.write_set.lock().len()
    }
}
