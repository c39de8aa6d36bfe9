//! The `local_priority_fifo` and `local_priority_lifo` disciplines: a
//! priority heap per unit, no stealing. The two variants differ only in the
//! tie-break direction within a band.

use crate::policy::PrioEntry;
use crate::task::Task;
use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::sync::Arc;

pub(crate) struct PriorityLocalQueues {
    lifo: bool,
    queues: Vec<Mutex<BinaryHeap<PrioEntry>>>,
}

impl PriorityLocalQueues {
    pub(crate) fn new(units: usize, lifo: bool) -> Self {
        Self {
            lifo,
            queues: (0..units).map(|_| Mutex::new(BinaryHeap::new())).collect(),
        }
    }

    pub(crate) fn push(&self, task: Arc<Task>, seq: u64, unit: usize) {
        self.queues[unit]
            .lock()
            .push(PrioEntry::new(task, seq, self.lifo));
    }

    pub(crate) fn pop(&self, unit: usize) -> Option<Arc<Task>> {
        self.queues[unit].lock().pop().map(|entry| entry.task)
    }

    pub(crate) fn drain(&self, unit: usize) -> Vec<Arc<Task>> {
        let heap = std::mem::take(&mut *self.queues[unit].lock());
        // into_sorted_vec is ascending; pop order is greatest-first
        heap.into_sorted_vec()
            .into_iter()
            .rev()
            .map(|entry| entry.task)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_util::dummy_task;
    use crate::policy::Priority;

    #[test]
    fn test_priority_bands_pop_high_first() {
        let queues = PriorityLocalQueues::new(1, false);
        let low = dummy_task(Priority::Low);
        let critical = dummy_task(Priority::Critical);
        let normal = dummy_task(Priority::Normal);

        queues.push(Arc::clone(&low), 0, 0);
        queues.push(Arc::clone(&critical), 1, 0);
        queues.push(Arc::clone(&normal), 2, 0);

        assert_eq!(queues.pop(0).unwrap().id(), critical.id());
        assert_eq!(queues.pop(0).unwrap().id(), normal.id());
        assert_eq!(queues.pop(0).unwrap().id(), low.id());
    }

    #[test]
    fn test_fifo_tie_break_within_band() {
        let queues = PriorityLocalQueues::new(1, false);
        let tasks: Vec<_> = (0..4).map(|_| dummy_task(Priority::Normal)).collect();
        for (seq, task) in tasks.iter().enumerate() {
            queues.push(Arc::clone(task), seq as u64, 0);
        }

        for task in &tasks {
            assert_eq!(queues.pop(0).unwrap().id(), task.id());
        }
    }

    #[test]
    fn test_lifo_tie_break_within_band() {
        let queues = PriorityLocalQueues::new(1, true);
        let tasks: Vec<_> = (0..4).map(|_| dummy_task(Priority::Normal)).collect();
        for (seq, task) in tasks.iter().enumerate() {
            queues.push(Arc::clone(task), seq as u64, 0);
        }

        for task in tasks.iter().rev() {
            assert_eq!(queues.pop(0).unwrap().id(), task.id());
        }
    }

    #[test]
    fn test_drain_in_pop_order() {
        let queues = PriorityLocalQueues::new(1, false);
        let normal = dummy_task(Priority::Normal);
        let high = dummy_task(Priority::High);
        queues.push(Arc::clone(&normal), 0, 0);
        queues.push(Arc::clone(&high), 1, 0);

        let drained = queues.drain(0);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id(), high.id());
        assert_eq!(drained[1].id(), normal.id());
        assert!(queues.pop(0).is_none());
    }
}
