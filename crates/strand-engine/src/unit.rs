//! Processing units: the per-worker state machine and the worker loop.
//!
//! A processing unit is one hardware execution context bound to one OS
//! thread. Its state field is the single source of truth for elastic
//! control: every transition goes through a compare-and-swap on that field,
//! so concurrent suspend/resume/stop requests are linearized per unit and
//! two racing suspends cannot both succeed.

use crate::mode::SchedulerMode;
use crate::pool::{PoolCore, PoolLifecycle};
use crate::topology;
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// State of one processing unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum UnitState {
    /// Dequeuing and executing tasks
    Active = 0,
    /// Suspend requested; the unit finishes its in-flight task first
    Suspending = 1,
    /// Parked on the idle signal; not dequeuing
    Suspended = 2,
    /// Resume requested; the unit re-enters Active on its next iteration
    Resuming = 3,
    /// Pool is draining and this unit found nothing reachable to run
    Stopping = 4,
    /// Worker loop exited; the OS thread can be joined
    Stopped = 5,
}

impl UnitState {
    fn from_u8(value: u8) -> UnitState {
        match value {
            0 => UnitState::Active,
            1 => UnitState::Suspending,
            2 => UnitState::Suspended,
            3 => UnitState::Resuming,
            4 => UnitState::Stopping,
            _ => UnitState::Stopped,
        }
    }
}

/// One worker, bound to one OS thread for its entire lifetime.
pub struct ProcessingUnit {
    /// Pool-local index
    index: usize,

    /// Hardware context this unit is bound to, when affinity was requested
    hardware_context: Option<usize>,

    /// Current state; mutated only through CAS
    state: AtomicU8,

    /// Whether the worker is currently parked on the idle signal
    parked: AtomicBool,

    /// Idle/wake signal
    idle_lock: Mutex<()>,
    idle_condvar: Condvar,
}

impl ProcessingUnit {
    pub(crate) fn new(index: usize, hardware_context: Option<usize>) -> Self {
        Self {
            index,
            hardware_context,
            state: AtomicU8::new(UnitState::Active as u8),
            parked: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle_condvar: Condvar::new(),
        }
    }

    /// Pool-local index of this unit.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The hardware context this unit was bound to, if any.
    pub fn hardware_context(&self) -> Option<usize> {
        self.hardware_context
    }

    /// Current state.
    pub fn state(&self) -> UnitState {
        UnitState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// CAS the state from `from` to `to`. Returns false if another request
    /// got there first.
    pub(crate) fn try_transition(&self, from: UnitState, to: UnitState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Wake the worker if it is parked on the idle signal.
    pub(crate) fn signal(&self) {
        let _guard = self.idle_lock.lock();
        self.idle_condvar.notify_all();
    }

    /// Park on the idle signal for at most `timeout`. The timeout bounds the
    /// cost of a missed notification; correctness never depends on the
    /// signal arriving.
    pub(crate) fn idle_wait(&self, timeout: Duration) {
        self.parked.store(true, Ordering::Release);
        let mut guard = self.idle_lock.lock();
        self.idle_condvar.wait_for(&mut guard, timeout);
        drop(guard);
        self.parked.store(false, Ordering::Release);
    }

    pub(crate) fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Acquire)
    }
}

/// Which units of a pool are currently accepting routed work.
///
/// Non-stealing policies consult this when choosing a push target so that
/// new work is never assigned to a suspended unit's private queue.
pub(crate) struct ActiveSet {
    flags: Vec<AtomicBool>,
    active: AtomicUsize,
}

impl ActiveSet {
    pub(crate) fn new(units: usize) -> Self {
        Self {
            flags: (0..units).map(|_| AtomicBool::new(true)).collect(),
            active: AtomicUsize::new(units),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.flags.len()
    }

    pub(crate) fn count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn is_active(&self, index: usize) -> bool {
        self.flags[index].load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self, index: usize) {
        if self.flags[index].swap(false, Ordering::AcqRel) {
            self.active.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn activate(&self, index: usize) {
        if !self.flags[index].swap(true, Ordering::AcqRel) {
            self.active.fetch_add(1, Ordering::AcqRel);
        }
    }
}

thread_local! {
    /// (pool id, unit index) of the worker running on this thread, if any.
    static CURRENT: Cell<Option<(u64, usize)>> = const { Cell::new(None) };
}

/// Unit index of the calling thread when it is a worker of pool `pool_id`.
/// Used as a locality hint when a worker submits or wakes into its own pool.
pub(crate) fn current_unit_for(pool_id: u64) -> Option<usize> {
    CURRENT.with(|current| match current.get() {
        Some((id, unit)) if id == pool_id => Some(unit),
        _ => None,
    })
}

/// Worker-thread entry point.
pub(crate) fn worker_loop(core: Arc<PoolCore>, index: usize) {
    let unit = Arc::clone(&core.units[index]);
    CURRENT.with(|current| current.set(Some((core.id(), index))));

    if let Some(context) = unit.hardware_context() {
        topology::bind_current_thread(context);
    }

    let mut priority_reduced = false;

    loop {
        match unit.state() {
            UnitState::Active => {
                if let Some(task) = core.claim(index) {
                    core.run_one(index, &task);
                    continue;
                }
                let mode = core.mode();
                if core.lifecycle() == PoolLifecycle::Draining {
                    // Nothing reachable: linger if asked, then advertise
                    // this unit as stoppable.
                    if mode.contains(SchedulerMode::DELAY_EXIT) && core.linger() {
                        continue;
                    }
                    unit.try_transition(UnitState::Active, UnitState::Stopping);
                    continue;
                }
                if mode.contains(SchedulerMode::DO_BACKGROUND_WORK) {
                    core.policy().rebalance(index);
                }
                unit.idle_wait(core.idle_backoff());
            }
            UnitState::Suspending => {
                if unit.try_transition(UnitState::Suspending, UnitState::Suspended) {
                    // catch pushes that raced the control-plane drain
                    core.remigrate(index);
                    park_suspended(&core, &unit);
                }
                // CAS failure means an immediate resume raced the suspend;
                // the next iteration re-reads the state.
            }
            UnitState::Suspended => park_suspended(&core, &unit),
            UnitState::Resuming => {
                unit.try_transition(UnitState::Resuming, UnitState::Active);
            }
            UnitState::Stopping => {
                if core.halted() {
                    unit.try_transition(UnitState::Stopping, UnitState::Stopped);
                    continue;
                }
                // A wake may have re-queued work after this unit went
                // stoppable; pick it up and withdraw from the stop set.
                if let Some(task) = core.claim(index) {
                    unit.try_transition(UnitState::Stopping, UnitState::Active);
                    core.run_one(index, &task);
                    continue;
                }
                let mode = core.mode();
                if mode.contains(SchedulerMode::REDUCE_THREAD_PRIORITY) {
                    if !priority_reduced {
                        priority_reduced = topology::reduce_current_thread_priority();
                    }
                    thread::yield_now();
                }
                let wait = if mode.contains(SchedulerMode::DELAY_EXIT) {
                    Duration::from_micros(200)
                } else {
                    Duration::from_millis(1)
                };
                unit.idle_wait(wait);
            }
            UnitState::Stopped => break,
        }
    }

    CURRENT.with(|current| current.set(None));

    #[cfg(debug_assertions)]
    eprintln!("strand worker {}/{} stopped", core.name(), index);
}

/// Park while Suspended. Returns when the unit is resumed, or converts the
/// unit to Stopping once the pool starts draining (a suspended unit holds no
/// reachable work, so it joins the stop set directly).
fn park_suspended(core: &Arc<PoolCore>, unit: &Arc<ProcessingUnit>) {
    loop {
        if unit.state() != UnitState::Suspended {
            return;
        }
        if core.lifecycle() == PoolLifecycle::Draining || core.halted() {
            unit.try_transition(UnitState::Suspended, UnitState::Stopping);
            return;
        }
        unit.idle_wait(Duration::from_millis(5));
    }
}
