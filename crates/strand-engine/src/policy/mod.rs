//! Pluggable per-pool queue disciplines.
//!
//! One concrete data structure per variant, selected once at pool creation
//! and dispatched through a single closed enum, so substituting a discipline
//! never costs a per-task virtual call. All variants expose the same
//! push/pop/steal contract:
//!
//! - `push` inserts a Pending task and never blocks.
//! - `pop(unit)` takes from the unit's own structure only.
//! - `try_steal(thief)` takes from a peer or shared structure; variants
//!   without stealing return `None` and their idle units poll instead.
//!
//! Within one unit's structure the documented order (FIFO/LIFO/priority) is
//! exact; across units under stealing, only eventual execution without
//! starvation is guaranteed. Equal priorities break ties by arrival
//! sequence, oldest first, in every variant that defines priority at all.

mod abp;
mod hierarchy;
mod local;
mod periodic;
mod priority;
mod static_assign;

use crate::task::Task;
use crate::unit::ActiveSet;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use abp::AbpQueues;
use hierarchy::HierarchyQueues;
use local::LocalQueues;
use periodic::PeriodicQueues;
use priority::PriorityLocalQueues;
use static_assign::StaticQueues;

/// Ordering key for priority-aware policies. Higher bands run first; ties
/// within a band go to the oldest arrival.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Priority {
    /// Background work
    Low = 0,
    /// The default band
    #[default]
    Normal = 1,
    /// Ahead of normal work
    High = 2,
    /// Ahead of everything
    Critical = 3,
}

impl Priority {
    /// Number of priority bands
    pub const COUNT: usize = 4;

    /// Band index, 0 = lowest
    pub fn index(self) -> usize {
        self as usize
    }

    /// Parse a band name as used in configuration and the CLI
    pub fn from_name(name: &str) -> Option<Priority> {
        match name {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

/// Which queue discipline a pool runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// FIFO queue per unit, no stealing
    Local,
    /// Priority bands per unit, FIFO within a band, no stealing
    LocalPriorityFifo,
    /// Priority bands per unit, LIFO within a band, no stealing
    LocalPriorityLifo,
    /// Lock-free deque per unit and band; idle units steal the far end
    AbpPriority,
    /// Tree of queues mirroring the hardware topology; nearer queues first
    Hierarchy,
    /// Fixed assignment at submission time, FIFO per unit
    Static,
    /// Fixed assignment at submission time, priority order per unit
    StaticPriority,
    /// Priority bands per unit; idle units periodically re-scan all queues
    PeriodicPriority,
}

impl PolicyKind {
    /// Canonical configuration name
    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Local => "local",
            PolicyKind::LocalPriorityFifo => "local_priority_fifo",
            PolicyKind::LocalPriorityLifo => "local_priority_lifo",
            PolicyKind::AbpPriority => "abp_priority",
            PolicyKind::Hierarchy => "hierarchy",
            PolicyKind::Static => "static",
            PolicyKind::StaticPriority => "static_priority",
            PolicyKind::PeriodicPriority => "periodic_priority",
        }
    }

    /// Parse a configuration name
    pub fn from_name(name: &str) -> Option<PolicyKind> {
        match name {
            "local" => Some(PolicyKind::Local),
            "local_priority_fifo" => Some(PolicyKind::LocalPriorityFifo),
            "local_priority_lifo" => Some(PolicyKind::LocalPriorityLifo),
            "abp_priority" => Some(PolicyKind::AbpPriority),
            "hierarchy" => Some(PolicyKind::Hierarchy),
            "static" => Some(PolicyKind::Static),
            "static_priority" => Some(PolicyKind::StaticPriority),
            "periodic_priority" => Some(PolicyKind::PeriodicPriority),
            _ => None,
        }
    }

    /// Whether idle units eagerly take work out of peer structures
    pub fn supports_stealing(self) -> bool {
        matches!(self, PolicyKind::AbpPriority | PolicyKind::Hierarchy)
    }

    /// Fixed-assignment variants: a task's owner is decided at push time and
    /// never changes, so elastic down-scaling would strand unclaimed work
    pub fn is_static(self) -> bool {
        matches!(self, PolicyKind::Static | PolicyKind::StaticPriority)
    }

    /// Whether a unit of this policy may be suspended at all
    pub fn suspendable(self) -> bool {
        !self.is_static()
    }

    /// Variants whose unit queues are unreachable from peers and therefore
    /// hand their backlog to the remaining active units on suspension
    pub fn migrates_on_suspend(self) -> bool {
        matches!(
            self,
            PolicyKind::Local
                | PolicyKind::LocalPriorityFifo
                | PolicyKind::LocalPriorityLifo
                | PolicyKind::PeriodicPriority
        )
    }
}

/// Heap entry for the priority-ordered structures. The `lifo` flag is fixed
/// per queue and flips the tie-break direction within a band.
pub(crate) struct PrioEntry {
    pub(crate) priority: Priority,
    pub(crate) seq: u64,
    pub(crate) lifo: bool,
    pub(crate) task: Arc<Task>,
}

impl PrioEntry {
    pub(crate) fn new(task: Arc<Task>, seq: u64, lifo: bool) -> Self {
        Self {
            priority: task.priority(),
            seq,
            lifo,
            task,
        }
    }
}

impl Ord for PrioEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority.cmp(&other.priority).then_with(|| {
            if self.lifo {
                // newest first within a band
                self.seq.cmp(&other.seq)
            } else {
                // oldest first within a band
                other.seq.cmp(&self.seq)
            }
        })
    }
}

impl PartialOrd for PrioEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PrioEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PrioEntry {}

enum Queues {
    Local(LocalQueues),
    LocalPriority(PriorityLocalQueues),
    Abp(AbpQueues),
    Hierarchy(HierarchyQueues),
    Static(StaticQueues),
    Periodic(PeriodicQueues),
}

/// One pool's queue discipline instance. Holds every Pending task of the
/// pool; the only state in the runtime mutated by more than one unit.
pub struct SchedulingPolicy {
    kind: PolicyKind,
    active: Arc<ActiveSet>,
    /// Arrival sequence, the priority tie-breaker
    seq: AtomicU64,
    /// Round-robin cursor for routing external pushes
    cursor: AtomicUsize,
    queues: Queues,
}

impl SchedulingPolicy {
    pub(crate) fn new(kind: PolicyKind, units: usize, active: Arc<ActiveSet>) -> Self {
        let queues = match kind {
            PolicyKind::Local => Queues::Local(LocalQueues::new(units)),
            PolicyKind::LocalPriorityFifo => {
                Queues::LocalPriority(PriorityLocalQueues::new(units, false))
            }
            PolicyKind::LocalPriorityLifo => {
                Queues::LocalPriority(PriorityLocalQueues::new(units, true))
            }
            PolicyKind::AbpPriority => Queues::Abp(AbpQueues::new(units)),
            PolicyKind::Hierarchy => Queues::Hierarchy(HierarchyQueues::new(units)),
            PolicyKind::Static => Queues::Static(StaticQueues::new(units, false)),
            PolicyKind::StaticPriority => Queues::Static(StaticQueues::new(units, true)),
            PolicyKind::PeriodicPriority => Queues::Periodic(PeriodicQueues::new(units)),
        };
        Self {
            kind,
            active,
            seq: AtomicU64::new(0),
            cursor: AtomicUsize::new(0),
            queues,
        }
    }

    /// The discipline this instance runs
    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Pick a push target among the currently active units, honoring the
    /// submitter's locality hint when that unit still accepts work.
    fn route(&self, hint: Option<usize>) -> usize {
        if let Some(unit) = hint {
            if self.active.is_active(unit) {
                return unit;
            }
        }
        let len = self.active.len();
        for _ in 0..len {
            let unit = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
            if self.active.is_active(unit) {
                return unit;
            }
        }
        // every unit suspended mid-drain; any target is reachable enough
        hint.unwrap_or(0)
    }

    /// Insert a Pending task. Never blocks.
    pub(crate) fn push(&self, task: Arc<Task>, hint: Option<usize>) {
        let seq = self.next_seq();
        match &self.queues {
            Queues::Local(q) => q.push(task, self.route(hint)),
            Queues::LocalPriority(q) => {
                let unit = self.route(hint);
                q.push(task, seq, unit);
            }
            Queues::Abp(q) => q.push(task, hint),
            Queues::Hierarchy(q) => q.push(task, seq, hint),
            Queues::Static(q) => q.push(task, seq, hint),
            Queues::Periodic(q) => {
                let unit = self.route(hint);
                q.push(task, seq, unit);
            }
        }
    }

    /// Take a task from `unit`'s own structure.
    pub(crate) fn pop(&self, unit: usize) -> Option<Arc<Task>> {
        match &self.queues {
            Queues::Local(q) => q.pop(unit),
            Queues::LocalPriority(q) => q.pop(unit),
            Queues::Abp(q) => q.pop(unit),
            Queues::Hierarchy(q) => q.pop(unit),
            Queues::Static(q) => q.pop(unit),
            Queues::Periodic(q) => q.pop(unit),
        }
    }

    /// Take a task from a peer or shared structure on behalf of `thief`.
    pub(crate) fn try_steal(&self, thief: usize) -> Option<Arc<Task>> {
        match &self.queues {
            Queues::Local(_) | Queues::LocalPriority(_) | Queues::Static(_) => None,
            Queues::Abp(q) => q.try_steal(thief),
            Queues::Hierarchy(q) => q.try_steal(thief),
            Queues::Periodic(q) => q.try_steal(thief),
        }
    }

    /// Remove and return everything queued on `unit`, in pop order. Used
    /// when suspending a unit of a migrating variant.
    pub(crate) fn drain_unit(&self, unit: usize) -> Vec<Arc<Task>> {
        match &self.queues {
            Queues::Local(q) => q.drain(unit),
            Queues::LocalPriority(q) => q.drain(unit),
            Queues::Periodic(q) => q.drain(unit),
            // stealing variants keep a suspended unit's backlog reachable,
            // and static variants refuse suspension before this point
            Queues::Abp(_) | Queues::Hierarchy(_) | Queues::Static(_) => Vec::new(),
        }
    }

    /// Idle-time bookkeeping hook (`DO_BACKGROUND_WORK`).
    pub(crate) fn rebalance(&self, unit: usize) {
        if let Queues::Abp(q) = &self.queues {
            q.rebalance(unit);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::dummy_task;
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_priority_names() {
        for priority in [
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Critical,
        ] {
            assert!(priority.index() < Priority::COUNT);
        }
        assert_eq!(Priority::from_name("high"), Some(Priority::High));
        assert_eq!(Priority::from_name("urgent"), None);
    }

    #[test]
    fn test_policy_kind_names_round_trip() {
        for kind in [
            PolicyKind::Local,
            PolicyKind::LocalPriorityFifo,
            PolicyKind::LocalPriorityLifo,
            PolicyKind::AbpPriority,
            PolicyKind::Hierarchy,
            PolicyKind::Static,
            PolicyKind::StaticPriority,
            PolicyKind::PeriodicPriority,
        ] {
            assert_eq!(PolicyKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(PolicyKind::from_name("round_robin"), None);
    }

    #[test]
    fn test_policy_kind_capabilities() {
        assert!(PolicyKind::AbpPriority.supports_stealing());
        assert!(PolicyKind::Hierarchy.supports_stealing());
        assert!(!PolicyKind::Local.supports_stealing());
        assert!(!PolicyKind::PeriodicPriority.supports_stealing());

        assert!(PolicyKind::Static.is_static());
        assert!(!PolicyKind::Static.suspendable());
        assert!(PolicyKind::Local.suspendable());

        assert!(PolicyKind::Local.migrates_on_suspend());
        assert!(PolicyKind::PeriodicPriority.migrates_on_suspend());
        assert!(!PolicyKind::AbpPriority.migrates_on_suspend());
        assert!(!PolicyKind::Static.migrates_on_suspend());
    }

    #[test]
    fn test_prio_entry_fifo_tie_break() {
        let older = PrioEntry::new(dummy_task(Priority::Normal), 1, false);
        let newer = PrioEntry::new(dummy_task(Priority::Normal), 2, false);
        // FIFO: the older entry is greater, so a max-heap pops it first
        assert!(older > newer);
    }

    #[test]
    fn test_prio_entry_lifo_tie_break() {
        let older = PrioEntry::new(dummy_task(Priority::Normal), 1, true);
        let newer = PrioEntry::new(dummy_task(Priority::Normal), 2, true);
        assert!(newer > older);
    }

    #[test]
    fn test_prio_entry_band_dominates_sequence() {
        let urgent_late = PrioEntry::new(dummy_task(Priority::High), 99, false);
        let normal_early = PrioEntry::new(dummy_task(Priority::Normal), 1, false);
        assert!(urgent_late > normal_early);
    }

    #[test]
    fn test_routing_skips_inactive_units() {
        let active = Arc::new(ActiveSet::new(4));
        let policy = SchedulingPolicy::new(PolicyKind::Local, 4, Arc::clone(&active));

        active.deactivate(1);
        active.deactivate(2);

        for _ in 0..16 {
            let unit = policy.route(None);
            assert!(unit == 0 || unit == 3, "routed to suspended unit {}", unit);
        }
        // A hint pointing at a suspended unit is overridden
        let unit = policy.route(Some(2));
        assert!(unit == 0 || unit == 3);
        // A hint pointing at an active unit is honored
        assert_eq!(policy.route(Some(3)), 3);
    }
}
