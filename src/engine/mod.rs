//! The transactional engine: the single value that owns the KV Map, the
//! Key Lock Table, the Wait-For Graph (via the Deadlock Detector), and the
//! Transaction Manager, and implements the Transaction API (§4.5) on top of
//! them.
//!
//! Constructed once and shared by `Arc` from the server layer; the engine
//! itself never spawns threads or owns an executor (§5).

pub mod deadlock;
pub mod kv_map;
pub mod lock_table;
pub mod transaction;
pub mod txn_manager;
pub mod wait_graph;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::common::TransactionId;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

use deadlock::DeadlockDetector;
use kv_map::KvMap;
use lock_table::{AcquireOutcome, LockTable};
use transaction::Transaction;
use txn_manager::TransactionManager;

/// The transactional key-value engine.
pub struct Engine {
    config: EngineConfig,
    kv_map: KvMap,
    lock_table: LockTable,
    detector: DeadlockDetector,
    txn_manager: TransactionManager,
}

impl Engine {
    /// Builds a new engine from `config`. Wrap in `Arc` to share across
    /// session threads.
    pub fn new(config: EngineConfig) -> Self {
        let lock_table = LockTable::new(config.n_slots);
        let detector = DeadlockDetector::new(config.max_txns);
        let txn_manager = TransactionManager::new(config.max_txns);
        Self {
            config,
            kv_map: KvMap::new(),
            lock_table,
            detector,
            txn_manager,
        }
    }

    /// Builds a new engine wrapped in `Arc`, ready to be shared by the
    /// server layer.
    pub fn shared(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Transaction lifecycle
    // ------------------------------------------------------------------

    /// Begins a new transaction. Returns `Overload` if the transaction
    /// slot table is exhausted.
    pub fn begin(&self) -> EngineResult<TransactionId> {
        let txn = self.txn_manager.begin()?;
        debug!(txn_id = txn.id, start_seq = txn.start_seq, "begin");
        Ok(txn.id)
    }

    /// Reads `key` under `txn_id`: the write-set first (read-your-writes),
    /// then the committed map after acquiring the key's slot lock.
    pub fn get(&self, txn_id: TransactionId, key: &[u8]) -> EngineResult<Vec<u8>> {
        self.validate_key(key)?;
        let txn = self.lookup(txn_id)?;

        if txn.is_aborted() {
            return Err(EngineError::Aborted(txn_id));
        }
        if let Some(value) = txn.find_write(key) {
            return Ok(value);
        }

        self.acquire_lock(&txn, key)?;

        self.kv_map.read(key).ok_or(EngineError::NotFound)
    }

    /// Buffers a write to `key` under `txn_id`, after acquiring the key's
    /// slot lock. The write is not visible to other transactions until
    /// `commit`.
    pub fn put(&self, txn_id: TransactionId, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.validate_key(key)?;
        self.validate_value(value)?;
        let txn = self.lookup(txn_id)?;

        if txn.is_aborted() {
            return Err(EngineError::Aborted(txn_id));
        }

        self.acquire_lock(&txn, key)?;

        let len = txn.push_write(key.to_vec(), value.to_vec());
        if len > self.config.max_writes {
            txn.mark_aborted();
            warn!(txn_id, "write-set full, transaction marked aborted");
            return Err(EngineError::WritesetFull(txn_id));
        }
        Ok(())
    }

    /// Flushes the buffered write-set to the KV Map in insertion order and
    /// releases all held locks. If the transaction was already aborted
    /// (e.g. selected as a deadlock victim), releases its locks and frees
    /// it without applying any writes.
    pub fn commit(&self, txn_id: TransactionId) -> EngineResult<()> {
        let txn = self.lookup(txn_id)?;

        if txn.is_aborted() {
            self.release_all(&txn);
            self.txn_manager.free(txn_id);
            warn!(txn_id, "commit of aborted transaction");
            return Err(EngineError::Aborted(txn_id));
        }

        for (key, value) in txn.drain_write_set() {
            self.kv_map.write(key, value);
        }

        self.detector.graph().clear_outgoing(txn_id);
        self.release_all(&txn);
        self.txn_manager.free(txn_id);
        info!(txn_id, "commit");
        Ok(())
    }

    /// Releases all held locks without flushing any buffered writes, then
    /// frees the transaction. Idempotent with respect to being selected as
    /// a deadlock victim: marking `aborted` here is a no-op if it was
    /// already set.
    pub fn abort(&self, txn_id: TransactionId) -> EngineResult<()> {
        let txn = self.lookup(txn_id)?;
        txn.mark_aborted();
        self.detector.graph().clear_outgoing(txn_id);
        self.release_all(&txn);
        self.txn_manager.free(txn_id);
        info!(txn_id, "abort");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    fn lookup(&self, txn_id: TransactionId) -> EngineResult<Arc<Transaction>> {
        self.txn_manager
            .get(txn_id)
            .ok_or(EngineError::NoSuchTransaction(txn_id))
    }

    fn validate_key(&self, key: &[u8]) -> EngineResult<()> {
        if key.is_empty() {
            return Err(EngineError::Invalid("key must not be empty".to_string()));
        }
        if key.len() > self.config.key_len {
            return Err(EngineError::Invalid(format!(
                "key length {} exceeds limit {}",
                key.len(),
                self.config.key_len
            )));
        }
        Ok(())
    }

    fn validate_value(&self, value: &[u8]) -> EngineResult<()> {
        if value.len() > self.config.value_len {
            return Err(EngineError::Invalid(format!(
                "value length {} exceeds limit {}",
                value.len(),
                self.config.value_len
            )));
        }
        Ok(())
    }

    /// Implements the lock-acquisition protocol of §4.5.4: fast path on a
    /// free or re-entrant slot, otherwise register a wait-edge, run
    /// deadlock detection once, then poll with a bounded timeout until the
    /// slot frees or `txn` is marked aborted.
    fn acquire_lock(&self, txn: &Arc<Transaction>, key: &[u8]) -> EngineResult<()> {
        if txn.is_aborted() {
            return Err(EngineError::Aborted(txn.id));
        }

        let slot = self.lock_table.slot_of(key);

        match self.lock_table.try_acquire(slot, txn.id) {
            AcquireOutcome::Acquired => {
                txn.record_held_lock(slot);
                self.detector.graph().clear_outgoing(txn.id);
                return Ok(());
            }
            AcquireOutcome::HeldBy(holder) => {
                self.detector.graph().add_edge(txn.id, holder);
                if let Some(victim) = self
                    .detector
                    .detect_and_select_victim(|id| self.txn_manager.start_seq_of(id))
                {
                    if let Some(victim_txn) = self.txn_manager.get(victim) {
                        victim_txn.mark_aborted();
                        warn!(
                            victim = victim,
                            waiter = txn.id,
                            holder,
                            "deadlock detected, marked victim"
                        );
                    }
                }
            }
        }

        loop {
            if txn.is_aborted() {
                self.detector.graph().clear_outgoing(txn.id);
                return Err(EngineError::Aborted(txn.id));
            }

            match self.lock_table.try_acquire(slot, txn.id) {
                AcquireOutcome::Acquired => {
                    txn.record_held_lock(slot);
                    self.detector.graph().clear_outgoing(txn.id);
                    return Ok(());
                }
                AcquireOutcome::HeldBy(_) => {
                    self.lock_table.wait(slot, self.config.wait_poll_interval);
                }
            }
        }
    }

    /// Releases every slot a transaction currently believes it holds, and
    /// clears incoming wait-edges once it no longer holds anything (an
    /// aborted transaction may hold none at all, in which case this is a
    /// no-op on the lock table but still clears any stale incoming edges).
    fn release_all(&self, txn: &Arc<Transaction>) {
        for slot in txn.held_slots() {
            self.lock_table.release(slot, txn.id);
        }
        self.detector.graph().clear_incoming(txn.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    #[test]
    fn begin_returns_distinct_ids() {
        let e = engine();
        let a = e.begin().unwrap();
        let b = e.begin().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn get_on_empty_store_is_not_found() {
        let e = engine();
        let t = e.begin().unwrap();
        match e.get(t, b"x") {
            Err(EngineError::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn put_then_commit_is_visible_to_a_later_transaction() {
        let e = engine();
        let t1 = e.begin().unwrap();
        e.put(t1, b"x", b"1").unwrap();
        e.commit(t1).unwrap();

        let t2 = e.begin().unwrap();
        assert_eq!(e.get(t2, b"x").unwrap(), b"1".to_vec());
    }

    #[test]
    fn read_your_writes_does_not_touch_the_map() {
        let e = engine();
        let t = e.begin().unwrap();
        e.put(t, b"k", b"v1").unwrap();
        assert_eq!(e.get(t, b"k").unwrap(), b"v1".to_vec());
        e.put(t, b"k", b"v2").unwrap();
        assert_eq!(e.get(t, b"k").unwrap(), b"v2".to_vec());
        e.abort(t).unwrap();

        let t2 = e.begin().unwrap();
        match e.get(t2, b"k") {
            Err(EngineError::NotFound) => {}
            other => panic!("expected NotFound after abort, got {other:?}"),
        }
    }

    #[test]
    fn abort_discards_buffered_writes() {
        let e = engine();
        let t = e.begin().unwrap();
        e.put(t, b"k", b"v").unwrap();
        e.abort(t).unwrap();

        let t2 = e.begin().unwrap();
        match e.get(t2, b"k") {
            Err(EngineError::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn re_entrant_put_on_same_key_is_fast_path() {
        let e = engine();
        let t = e.begin().unwrap();
        e.put(t, b"k", b"v1").unwrap();
        e.put(t, b"k", b"v2").unwrap();
        e.commit(t).unwrap();

        let t2 = e.begin().unwrap();
        assert_eq!(e.get(t2, b"k").unwrap(), b"v2".to_vec());
    }

    #[test]
    fn non_conflicting_transactions_on_distinct_slots_do_not_block() {
        let e = Engine::new(EngineConfig::default().with_n_slots(4096));
        let t1 = e.begin().unwrap();
        let t2 = e.begin().unwrap();
        e.put(t1, b"k1", b"a").unwrap();
        e.put(t2, b"k2", b"b").unwrap();
        assert_eq!(e.detector.graph().edge_count(), 0);
        e.commit(t1).unwrap();
        e.commit(t2).unwrap();
    }

    #[test]
    fn overload_once_max_txns_is_reached() {
        let e = Engine::new(EngineConfig::default().with_max_txns(2));
        let _a = e.begin().unwrap();
        let _b = e.begin().unwrap();
        match e.begin() {
            Err(EngineError::Overload) => {}
            other => panic!("expected Overload, got {other:?}"),
        }
    }

    #[test]
    fn writeset_full_marks_transaction_aborted() {
        let e = Engine::new(EngineConfig::default().with_max_writes(2));
        let t = e.begin().unwrap();
        e.put(t, b"a", b"1").unwrap();
        e.put(t, b"b", b"2").unwrap();
        match e.put(t, b"c", b"3") {
            Err(EngineError::WritesetFull(id)) => assert_eq!(id, t),
            other => panic!("expected WritesetFull, got {other:?}"),
        }
        match e.commit(t) {
            Err(EngineError::Aborted(_)) => {}
            other => panic!("expected Aborted on commit, got {other:?}"),
        }
    }

    #[test]
    fn invalid_key_is_rejected_without_state_change() {
        let e = engine();
        let t = e.begin().unwrap();
        let oversized = vec![b'k'; e.config().key_len + 1];
        match e.put(t, &oversized, b"v") {
            Err(EngineError::Invalid(_)) => {}
            other => panic!("expected Invalid, got {other:?}"),
        }
        assert_eq!(e.detector.graph().edge_count(), 0);
    }

    #[test]
    fn operating_on_unknown_transaction_is_rejected() {
        let e = engine();
        match e.get(999, b"x") {
            Err(EngineError::NoSuchTransaction(999)) => {}
            other => panic!("expected NoSuchTransaction, got {other:?}"),
        }
    }
}
