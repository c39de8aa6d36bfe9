//! The `hierarchy` discipline: a tree of priority queues mirroring the
//! hardware topology. Each unit owns a leaf; interior nodes are shared.
//! External submissions land at the root and flow down as units steal;
//! worker-local submissions land on the submitter's leaf.
//!
//! Stealing prefers nearer queues: a thief walks its ancestor chain from the
//! closest interior node to the root, then tries peer leaves ordered by tree
//! distance. That keeps work inside the smallest topology subtree that can
//! absorb it.

use crate::policy::PrioEntry;
use crate::task::Task;
use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Arity of the queue tree. Two mirrors the core-pair/cluster nesting the
/// topology reports on common parts.
const FAN_OUT: usize = 2;

pub(crate) struct HierarchyQueues {
    /// All queues; leaves first, then interior levels bottom-up
    nodes: Vec<Mutex<BinaryHeap<PrioEntry>>>,

    /// Parent links; `None` only for the root
    parent: Vec<Option<usize>>,

    /// unit index → leaf node id
    leaf: Vec<usize>,

    /// The shared entry point for external submissions
    root: usize,

    /// unit index → peer units ordered nearest-first
    steal_order: Vec<Vec<usize>>,
}

impl HierarchyQueues {
    pub(crate) fn new(units: usize) -> Self {
        assert!(units > 0, "a pool needs at least one unit");

        // Leaves are node ids 0..units; interior levels are appended above.
        let mut parent: Vec<Option<usize>> = vec![None; units];
        let mut level: Vec<usize> = (0..units).collect();
        let mut next_id = units;

        while level.len() > 1 {
            let mut above = Vec::with_capacity(level.len().div_ceil(FAN_OUT));
            for children in level.chunks(FAN_OUT) {
                let node = next_id;
                next_id += 1;
                parent.push(None);
                for &child in children {
                    parent[child] = Some(node);
                }
                above.push(node);
            }
            level = above;
        }
        let root = level[0];

        let leaf: Vec<usize> = (0..units).collect();
        let steal_order = (0..units)
            .map(|unit| Self::order_by_distance(unit, units, &parent))
            .collect();

        Self {
            nodes: (0..next_id).map(|_| Mutex::new(BinaryHeap::new())).collect(),
            parent,
            leaf,
            root,
            steal_order,
        }
    }

    /// Peers of `unit` sorted by how deep their lowest common ancestor sits,
    /// nearest subtree first.
    fn order_by_distance(unit: usize, units: usize, parent: &[Option<usize>]) -> Vec<usize> {
        let ancestors = |mut node: usize| -> Vec<usize> {
            let mut chain = vec![node];
            while let Some(up) = parent[node] {
                chain.push(up);
                node = up;
            }
            chain
        };

        let own = ancestors(unit);
        let mut peers: Vec<(usize, usize)> = (0..units)
            .filter(|&peer| peer != unit)
            .map(|peer| {
                let theirs = ancestors(peer);
                // distance = steps from this unit up to the common ancestor
                let meet = own
                    .iter()
                    .position(|node| theirs.contains(node))
                    .unwrap_or(own.len());
                (meet, peer)
            })
            .collect();
        peers.sort_unstable();
        peers.into_iter().map(|(_, peer)| peer).collect()
    }

    pub(crate) fn push(&self, task: Arc<Task>, seq: u64, hint: Option<usize>) {
        let node = match hint {
            Some(unit) => self.leaf[unit],
            None => self.root,
        };
        self.nodes[node].lock().push(PrioEntry::new(task, seq, false));
    }

    pub(crate) fn pop(&self, unit: usize) -> Option<Arc<Task>> {
        self.nodes[self.leaf[unit]].lock().pop().map(|entry| entry.task)
    }

    pub(crate) fn try_steal(&self, thief: usize) -> Option<Arc<Task>> {
        // Ancestor chain first: the nearest shared queue wins
        let mut node = self.parent[self.leaf[thief]];
        while let Some(id) = node {
            if let Some(entry) = self.nodes[id].lock().pop() {
                return Some(entry.task);
            }
            node = self.parent[id];
        }

        // Then peer leaves, nearest subtree first
        for &peer in &self.steal_order[thief] {
            if let Some(entry) = self.nodes[self.leaf[peer]].lock().pop() {
                return Some(entry.task);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_util::dummy_task;
    use crate::policy::Priority;

    #[test]
    fn test_single_unit_tree_is_one_node() {
        let queues = HierarchyQueues::new(1);
        let task = dummy_task(Priority::Normal);

        // root == leaf: external pushes are directly poppable
        queues.push(Arc::clone(&task), 0, None);
        assert_eq!(queues.pop(0).unwrap().id(), task.id());
    }

    #[test]
    fn test_external_push_lands_at_root() {
        let queues = HierarchyQueues::new(4);
        let task = dummy_task(Priority::Normal);
        queues.push(Arc::clone(&task), 0, None);

        // no leaf owns it; any unit can steal it from the shared chain
        assert!(queues.pop(2).is_none());
        assert_eq!(queues.try_steal(2).unwrap().id(), task.id());
    }

    #[test]
    fn test_local_push_lands_on_leaf() {
        let queues = HierarchyQueues::new(4);
        let task = dummy_task(Priority::Normal);
        queues.push(Arc::clone(&task), 0, Some(3));

        assert!(queues.pop(0).is_none());
        assert_eq!(queues.pop(3).unwrap().id(), task.id());
    }

    #[test]
    fn test_steal_prefers_nearer_leaf() {
        let queues = HierarchyQueues::new(4);
        // unit 1 shares a parent with unit 0; unit 3 is across the tree
        let near = dummy_task(Priority::Normal);
        let far = dummy_task(Priority::Normal);
        queues.push(Arc::clone(&near), 0, Some(1));
        queues.push(Arc::clone(&far), 1, Some(3));

        assert_eq!(queues.try_steal(0).unwrap().id(), near.id());
        assert_eq!(queues.try_steal(0).unwrap().id(), far.id());
    }

    #[test]
    fn test_priority_order_at_root() {
        let queues = HierarchyQueues::new(2);
        let normal = dummy_task(Priority::Normal);
        let critical = dummy_task(Priority::Critical);
        queues.push(Arc::clone(&normal), 0, None);
        queues.push(Arc::clone(&critical), 1, None);

        assert_eq!(queues.try_steal(0).unwrap().id(), critical.id());
        assert_eq!(queues.try_steal(0).unwrap().id(), normal.id());
    }

    #[test]
    fn test_suspended_units_backlog_remains_reachable() {
        let queues = HierarchyQueues::new(4);
        let task = dummy_task(Priority::Normal);
        queues.push(Arc::clone(&task), 0, Some(2));

        // any other unit can reach unit 2's leaf through the peer walk
        assert_eq!(queues.try_steal(0).unwrap().id(), task.id());
    }
}
