//! Online deadlock detection: wraps the wait-for graph and adds
//! youngest-victim selection.
//!
//! Runs after every successful `add_edge` performed because a transaction
//! must wait on a lock holder (§4.3), under the same external
//! synchronization the lock-acquisition protocol already holds (a slot's
//! internal mutex), so edge additions and cycle scans are mutually
//! exclusive in practice even though the graph itself only guards its own
//! matrix.

use crate::common::{StartSeq, TransactionId};
use crate::engine::wait_graph::WaitForGraph;

/// Wraps a [`WaitForGraph`] with victim-selection policy.
pub struct DeadlockDetector {
    graph: WaitForGraph,
}

impl DeadlockDetector {
    /// Creates a detector over a graph sized for `max_txns` transaction ids.
    pub fn new(max_txns: usize) -> Self {
        Self {
            graph: WaitForGraph::new(max_txns),
        }
    }

    /// The underlying wait-for graph.
    pub fn graph(&self) -> &WaitForGraph {
        &self.graph
    }

    /// Searches for a cycle and, if one is found, selects the victim: the
    /// cycle member with the highest `start_seq` (youngest), ties (normally
    /// unreachable since `start_seq` is strictly increasing) broken by
    /// lowest transaction id.
    ///
    /// `start_seq_of` looks up the start sequence for a transaction id
    /// still participating in the cycle; it is supplied by the caller
    /// (the transaction manager) to avoid this module depending on it.
    pub fn detect_and_select_victim(
        &self,
        start_seq_of: impl Fn(TransactionId) -> Option<StartSeq>,
    ) -> Option<TransactionId> {
        let cycle = self.graph.find_cycle()?;
        Self::select_victim(&cycle, start_seq_of)
    }

    /// Pure victim-selection step, exposed separately so it can be unit
    /// tested against a fabricated cycle without a graph.
    pub fn select_victim(
        cycle: &[TransactionId],
        start_seq_of: impl Fn(TransactionId) -> Option<StartSeq>,
    ) -> Option<TransactionId> {
        let mut best: Option<(StartSeq, TransactionId)> = None;
        for &id in cycle {
            let seq = start_seq_of(id).unwrap_or(0);
            best = match best {
                None => Some((seq, id)),
                Some((best_seq, best_id)) => {
                    if seq > best_seq || (seq == best_seq && id < best_id) {
                        Some((seq, id))
                    } else {
                        Some((best_seq, best_id))
                    }
                }
            };
        }
        best.map(|(_, id)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn no_cycle_selects_no_victim() {
        let d = DeadlockDetector::new(8);
        d.graph().add_edge(1, 2);
        let seqs: HashMap<TransactionId, StartSeq> = [(1, 10), (2, 20)].into_iter().collect();
        assert_eq!(d.detect_and_select_victim(|id| seqs.get(&id).copied()), None);
    }

    #[test]
    fn cycle_selects_youngest_by_start_seq() {
        let d = DeadlockDetector::new(8);
        d.graph().add_edge(1, 2);
        d.graph().add_edge(2, 1);
        let seqs: HashMap<TransactionId, StartSeq> = [(1, 10), (2, 20)].into_iter().collect();
        let victim = d.detect_and_select_victim(|id| seqs.get(&id).copied());
        assert_eq!(victim, Some(2));
    }

    #[test]
    fn three_way_cycle_selects_highest_seq_member() {
        let d = DeadlockDetector::new(8);
        d.graph().add_edge(1, 2);
        d.graph().add_edge(2, 3);
        d.graph().add_edge(3, 1);
        let seqs: HashMap<TransactionId, StartSeq> =
            [(1, 5), (2, 50), (3, 30)].into_iter().collect();
        let victim = d.detect_and_select_victim(|id| seqs.get(&id).copied());
        assert_eq!(victim, Some(2));
    }

    #[test]
    fn tie_breaks_on_lowest_id() {
        let cycle = vec![5, 3, 7];
        let seqs: HashMap<TransactionId, StartSeq> =
            [(5, 100), (3, 100), (7, 100)].into_iter().collect();
        let victim = DeadlockDetector::select_victim(&cycle, |id| seqs.get(&id).copied());
        assert_eq!(victim, Some(3));
    }
}
