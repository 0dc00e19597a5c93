//! The wait-for graph: `W[a][b]` is true iff transaction `a` is currently
//! waiting for a lock held by transaction `b`.
//!
//! Guarded by a single mutex, per the concurrency model (§5): the graph
//! mutex is always acquired while holding a slot mutex, and released before
//! parking.

use parking_lot::Mutex;

use crate::common::TransactionId;

/// Directed graph over transaction ids, represented as a dense boolean
/// matrix sized `max_txns x max_txns` — small (`MAX_TXNS`, e.g. 32) by
/// design, so a matrix is cheaper and simpler than an adjacency list.
pub struct WaitForGraph {
    max_txns: usize,
    matrix: Mutex<Vec<bool>>,
}

impl WaitForGraph {
    /// Creates an empty graph over `max_txns` transaction ids.
    pub fn new(max_txns: usize) -> Self {
        Self {
            max_txns,
            matrix: Mutex::new(vec![false; max_txns * max_txns]),
        }
    }

    fn idx(&self, a: TransactionId, b: TransactionId) -> usize {
        a * self.max_txns + b
    }

    /// Records that `a` is waiting for `b`. A self-edge is never recorded
    /// (invariant: `W[a][a]` is always false).
    pub fn add_edge(&self, a: TransactionId, b: TransactionId) {
        if a == b {
            return;
        }
        let i = self.idx(a, b);
        self.matrix.lock()[i] = true;
    }

    /// Removes a specific edge.
    pub fn remove_edge(&self, a: TransactionId, b: TransactionId) {
        let i = self.idx(a, b);
        self.matrix.lock()[i] = false;
    }

    /// Clears all outgoing edges from `a` (called once `a` stops waiting,
    /// whether because it acquired its lock or because it aborted).
    pub fn clear_outgoing(&self, a: TransactionId) {
        let mut matrix = self.matrix.lock();
        for b in 0..self.max_txns {
            matrix[a * self.max_txns + b] = false;
        }
    }

    /// Clears all incoming edges to `b` (called when `b` releases its last
    /// lock, per the invariant that a holder with no locks has no waiters).
    pub fn clear_incoming(&self, b: TransactionId) {
        let mut matrix = self.matrix.lock();
        for a in 0..self.max_txns {
            matrix[a * self.max_txns + b] = false;
        }
    }

    /// Depth-first search for a cycle reachable from any node. Returns the
    /// set of nodes on one found cycle (not necessarily all cycles in the
    /// graph), or `None` if the graph is currently acyclic.
    ///
    /// Must be called with the graph's mutex effectively held by the caller
    /// (callers invoke this right after `add_edge`, under the same external
    /// synchronization used by the lock-acquisition protocol in §4.5.4) so
    /// that edge additions and cycle scans are mutually exclusive.
    pub fn find_cycle(&self) -> Option<Vec<TransactionId>> {
        let matrix = self.matrix.lock();
        let n = self.max_txns;
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];
        let mut parent = vec![None; n];

        for start in 0..n {
            if visited[start] {
                continue;
            }
            if let Some(cycle) = Self::dfs(&matrix, n, start, &mut visited, &mut on_stack, &mut parent) {
                return Some(cycle);
            }
        }
        None
    }

    /// Iterative DFS (avoids unbounded recursion depth for large `max_txns`)
    /// mirroring the parent-pointer cycle reconstruction of the reference
    /// implementation: when an edge into an on-stack node `v` is found, walk
    /// parent pointers from the current node back to `v` to collect the
    /// full cycle.
    fn dfs(
        matrix: &[bool],
        n: usize,
        start: TransactionId,
        visited: &mut [bool],
        on_stack: &mut [bool],
        parent: &mut [Option<TransactionId>],
    ) -> Option<Vec<TransactionId>> {
        // Explicit stack of (node, next neighbor index to try) to emulate
        // recursion without risking stack overflow for large max_txns.
        let mut stack: Vec<(TransactionId, usize)> = vec![(start, 0)];
        visited[start] = true;
        on_stack[start] = true;

        while let Some(top) = stack.last().copied() {
            let (u, mut next) = top;
            let mut found_child = None;
            let mut cycle = None;

            while next < n {
                let v = next;
                next += 1;
                if !matrix[u * n + v] {
                    continue;
                }
                if on_stack[v] {
                    // Back-edge into a node on the current path: reconstruct
                    // the cycle v -> ... -> u -> v by walking parent pointers.
                    let mut nodes = vec![v];
                    let mut cur = u;
                    while cur != v {
                        nodes.push(cur);
                        match parent[cur] {
                            Some(p) => cur = p,
                            None => break,
                        }
                    }
                    cycle = Some(nodes);
                    break;
                }
                if !visited[v] {
                    visited[v] = true;
                    on_stack[v] = true;
                    parent[v] = Some(u);
                    found_child = Some(v);
                    break;
                }
            }

            if let Some(nodes) = cycle {
                return Some(nodes);
            }

            let last = stack.last_mut().expect("stack non-empty");
            last.1 = next;

            if let Some(child) = found_child {
                stack.push((child, 0));
            } else if next >= n {
                on_stack[u] = false;
                stack.pop();
            }
        }
        None
    }

    /// Total number of set edges, for diagnostics/tests.
    pub fn edge_count(&self) -> usize {
        self.matrix.lock().iter().filter(|&&b| b).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_edges_no_cycle() {
        let g = WaitForGraph::new(8);
        assert!(g.find_cycle().is_none());
    }

    #[test]
    fn self_edge_is_never_recorded() {
        let g = WaitForGraph::new(8);
        g.add_edge(1, 1);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn two_cycle_is_detected() {
        let g = WaitForGraph::new(8);
        g.add_edge(1, 2);
        g.add_edge(2, 1);
        let cycle = g.find_cycle().expect("cycle");
        assert!(cycle.contains(&1));
        assert!(cycle.contains(&2));
    }

    #[test]
    fn three_way_cycle_is_detected() {
        let g = WaitForGraph::new(8);
        g.add_edge(1, 2); // T1 holds a, waits b
        g.add_edge(2, 3); // T2 holds b, waits c
        g.add_edge(3, 1); // T3 holds c, waits a
        let cycle = g.find_cycle().expect("cycle");
        assert!(cycle.contains(&1));
        assert!(cycle.contains(&2));
        assert!(cycle.contains(&3));
    }

    #[test]
    fn chain_without_cycle_is_not_flagged() {
        let g = WaitForGraph::new(8);
        g.add_edge(1, 2);
        g.add_edge(2, 3);
        assert!(g.find_cycle().is_none());
    }

    #[test]
    fn clear_outgoing_removes_only_that_nodes_edges() {
        let g = WaitForGraph::new(8);
        g.add_edge(1, 2);
        g.add_edge(2, 3);
        g.clear_outgoing(1);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn clear_incoming_removes_only_edges_into_that_node() {
        let g = WaitForGraph::new(8);
        g.add_edge(1, 3);
        g.add_edge(2, 3);
        g.clear_incoming(3);
        assert_eq!(g.edge_count(), 0);
    }
}
