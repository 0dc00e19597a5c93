//! Transaction slot allocation and start-sequence assignment.
//!
//! Holds a fixed-size table of `max_txns` slots; `begin` allocates a free
//! one and assigns the next `start_seq`, `free` returns it to the pool.
//! Transactions are kept behind `Arc` so the deadlock detector and the
//! owning session can both hold a handle; the back-reference from the wait
//! graph is always a lookup by id through this table, never a raw pointer,
//! so a freed transaction id is safely inert.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{StartSeq, TransactionId};
use crate::engine::transaction::Transaction;
use crate::error::{EngineError, EngineResult};

pub struct TransactionManager {
    slots: Mutex<Vec<Option<Arc<Transaction>>>>,
    next_seq: AtomicU64,
}

impl TransactionManager {
    /// Creates a manager with `max_txns` slots, all initially free.
    pub fn new(max_txns: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; max_txns]),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Allocates a free transaction slot and assigns it the next
    /// monotonically increasing `start_seq`. Returns `Overload` if every
    /// slot is in use.
    pub fn begin(&self) -> EngineResult<Arc<Transaction>> {
        let mut slots = self.slots.lock();
        let id = slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(EngineError::Overload)?;

        let start_seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(id, start_seq));
        slots[id] = Some(Arc::clone(&txn));
        Ok(txn)
    }

    /// Looks up the transaction currently occupying `id`, if any.
    pub fn get(&self, id: TransactionId) -> Option<Arc<Transaction>> {
        self.slots.lock().get(id).and_then(|slot| slot.clone())
    }

    /// The `start_seq` of the transaction currently occupying `id`, if any.
    /// Used by the deadlock detector to rank cycle members without taking a
    /// dependency on this module.
    pub fn start_seq_of(&self, id: TransactionId) -> Option<StartSeq> {
        self.get(id).map(|t| t.start_seq)
    }

    /// Returns the slot to the pool. Safe to call exactly once per
    /// transaction, at commit or abort; calling it again is a harmless
    /// no-op since the slot is already empty.
    pub fn free(&self, id: TransactionId) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(id) {
            *slot = None;
        }
    }

    /// Number of currently active transactions, for diagnostics and tests.
    pub fn active_count(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Total slot capacity.
    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_assigns_increasing_sequences() {
        let tm = TransactionManager::new(4);
        let t1 = tm.begin().unwrap();
        let t2 = tm.begin().unwrap();
        assert!(t2.start_seq > t1.start_seq);
    }

    #[test]
    fn begin_fails_once_capacity_is_exhausted() {
        let tm = TransactionManager::new(2);
        let _a = tm.begin().unwrap();
        let _b = tm.begin().unwrap();
        match tm.begin() {
            Err(EngineError::Overload) => {}
            other => panic!("expected Overload, got {other:?}"),
        }
    }

    #[test]
    fn free_returns_the_slot_to_the_pool() {
        let tm = TransactionManager::new(1);
        let t = tm.begin().unwrap();
        tm.free(t.id);
        assert!(tm.begin().is_ok());
    }

    #[test]
    fn freed_id_is_inert() {
        let tm = TransactionManager::new(2);
        let t = tm.begin().unwrap();
        tm.free(t.id);
        assert!(tm.get(t.id).is_none());
    }
}
