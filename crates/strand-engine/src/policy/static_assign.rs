//! The `static` and `static_priority` disciplines: a task's owning unit is
//! fixed at push time (round-robin over all units, or the submitter itself)
//! and never changes. Built for affinity-critical workloads; the pool layer
//! refuses to suspend units of these variants because an unclaimed backlog
//! would become unreachable.

use crate::policy::PrioEntry;
use crate::task::Task;
use parking_lot::Mutex;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;

enum Lane {
    Fifo(VecDeque<Arc<Task>>),
    Heap(BinaryHeap<PrioEntry>),
}

pub(crate) struct StaticQueues {
    lanes: Vec<Mutex<Lane>>,
}

impl StaticQueues {
    pub(crate) fn new(units: usize, prioritized: bool) -> Self {
        Self {
            lanes: (0..units)
                .map(|_| {
                    Mutex::new(if prioritized {
                        Lane::Heap(BinaryHeap::new())
                    } else {
                        Lane::Fifo(VecDeque::new())
                    })
                })
                .collect(),
        }
    }

    /// Fixed assignment: the submitter's own unit, or round-robin by
    /// arrival sequence. Deliberately ignores the pool's active set.
    pub(crate) fn push(&self, task: Arc<Task>, seq: u64, hint: Option<usize>) {
        let unit = hint.unwrap_or(seq as usize % self.lanes.len());
        match &mut *self.lanes[unit].lock() {
            Lane::Fifo(queue) => queue.push_back(task),
            Lane::Heap(heap) => heap.push(PrioEntry::new(task, seq, false)),
        }
    }

    pub(crate) fn pop(&self, unit: usize) -> Option<Arc<Task>> {
        match &mut *self.lanes[unit].lock() {
            Lane::Fifo(queue) => queue.pop_front(),
            Lane::Heap(heap) => heap.pop().map(|entry| entry.task),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_util::dummy_task;
    use crate::policy::Priority;

    #[test]
    fn test_round_robin_assignment() {
        let queues = StaticQueues::new(2, false);
        let even = dummy_task(Priority::Normal);
        let odd = dummy_task(Priority::Normal);
        queues.push(Arc::clone(&even), 0, None);
        queues.push(Arc::clone(&odd), 1, None);

        assert_eq!(queues.pop(0).unwrap().id(), even.id());
        assert_eq!(queues.pop(1).unwrap().id(), odd.id());
    }

    #[test]
    fn test_hint_pins_to_submitter() {
        let queues = StaticQueues::new(4, false);
        let task = dummy_task(Priority::Normal);
        queues.push(Arc::clone(&task), 0, Some(3));

        assert!(queues.pop(0).is_none());
        assert_eq!(queues.pop(3).unwrap().id(), task.id());
    }

    #[test]
    fn test_fifo_within_unit() {
        let queues = StaticQueues::new(1, false);
        let first = dummy_task(Priority::Normal);
        let second = dummy_task(Priority::Normal);
        queues.push(Arc::clone(&first), 0, None);
        queues.push(Arc::clone(&second), 1, None);

        assert_eq!(queues.pop(0).unwrap().id(), first.id());
        assert_eq!(queues.pop(0).unwrap().id(), second.id());
    }

    #[test]
    fn test_priority_within_unit() {
        let queues = StaticQueues::new(1, true);
        let low = dummy_task(Priority::Low);
        let critical = dummy_task(Priority::Critical);
        queues.push(Arc::clone(&low), 0, None);
        queues.push(Arc::clone(&critical), 1, None);

        assert_eq!(queues.pop(0).unwrap().id(), critical.id());
        assert_eq!(queues.pop(0).unwrap().id(), low.id());
    }

    #[test]
    fn test_unclaimed_backlog_stays_put() {
        let queues = StaticQueues::new(2, false);
        let task = dummy_task(Priority::Normal);
        queues.push(Arc::clone(&task), 0, None);

        // no other unit can reach unit 0's lane
        assert!(queues.pop(1).is_none());
        assert_eq!(queues.pop(0).unwrap().id(), task.id());
    }
}
