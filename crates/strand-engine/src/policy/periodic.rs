//! The `periodic_priority` discipline: a priority heap per unit and no
//! eager stealing. An idle unit is allowed to re-scan every queue in the
//! pool, but only once per rescan interval. This is the bounded-latency fallback
//! for workloads where eager stealing is undesirable.

use crate::policy::PrioEntry;
use crate::task::Task;
use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on how long a queued task can sit unnoticed by idle units.
const RESCAN_INTERVAL: Duration = Duration::from_millis(1);

pub(crate) struct PeriodicQueues {
    queues: Vec<Mutex<BinaryHeap<PrioEntry>>>,
    /// When each unit last ran its full re-scan
    last_scan: Vec<Mutex<Option<Instant>>>,
    interval: Duration,
}

impl PeriodicQueues {
    pub(crate) fn new(units: usize) -> Self {
        Self {
            queues: (0..units).map(|_| Mutex::new(BinaryHeap::new())).collect(),
            last_scan: (0..units).map(|_| Mutex::new(None)).collect(),
            interval: RESCAN_INTERVAL,
        }
    }

    pub(crate) fn push(&self, task: Arc<Task>, seq: u64, unit: usize) {
        self.queues[unit]
            .lock()
            .push(PrioEntry::new(task, seq, false));
    }

    pub(crate) fn pop(&self, unit: usize) -> Option<Arc<Task>> {
        self.queues[unit].lock().pop().map(|entry| entry.task)
    }

    /// The periodic re-scan. Rate-limited per thief; between scans this is
    /// indistinguishable from a non-stealing policy.
    pub(crate) fn try_steal(&self, thief: usize) -> Option<Arc<Task>> {
        {
            let mut last = self.last_scan[thief].lock();
            if let Some(at) = *last {
                if at.elapsed() < self.interval {
                    return None;
                }
            }
            *last = Some(Instant::now());
        }

        for (unit, queue) in self.queues.iter().enumerate() {
            if unit == thief {
                continue;
            }
            if let Some(entry) = queue.lock().pop() {
                return Some(entry.task);
            }
        }
        None
    }

    pub(crate) fn drain(&self, unit: usize) -> Vec<Arc<Task>> {
        let heap = std::mem::take(&mut *self.queues[unit].lock());
        heap.into_sorted_vec()
            .into_iter()
            .rev()
            .map(|entry| entry.task)
            .collect()
    }
}
