//! Per-pool scheduling counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Internal counters, bumped from worker threads with relaxed ordering; the
/// snapshot is advisory, never part of a correctness protocol.
#[derive(Default)]
pub(crate) struct PoolStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    stolen: AtomicU64,
    woken: AtomicU64,
    migrated: AtomicU64,
}

impl PoolStats {
    pub(crate) fn submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stolen(&self) {
        self.stolen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn woken(&self) {
        self.woken.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn migrated(&self, count: u64) {
        self.migrated.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stolen: self.stolen.load(Ordering::Relaxed),
            woken: self.woken.load(Ordering::Relaxed),
            migrated: self.migrated.load(Ordering::Relaxed),
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Tasks accepted by `submit`
    pub submitted: u64,

    /// Tasks that reached Completed with a result
    pub completed: u64,

    /// Tasks that reached Completed with a captured fault
    pub failed: u64,

    /// Tasks claimed through `try_steal`
    pub stolen: u64,

    /// Suspended tasks re-queued by a wake
    pub woken: u64,

    /// Tasks re-routed off a unit when it was suspended
    pub migrated: u64,
}
