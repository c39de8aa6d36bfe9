//! Worker thread pools: lifecycle, elastic control, and coordinated
//! shutdown.
//!
//! A pool owns N processing units sharing one scheduling-policy instance.
//! Quiescence accounting runs on three SeqCst counters (pending, running,
//! suspended) plus a work-arrival epoch. Counters are always bumped
//! destination-before-source when a task moves between them, so their sum
//! never transiently undercounts; the epoch pins the drain check's snapshot
//! against a wake landing mid-check.

use crate::config::RuntimeOptions;
use crate::error::{PoolError, ShutdownError, TaskError};
use crate::mode::SchedulerMode;
use crate::policy::{PolicyKind, Priority, SchedulingPolicy};
use crate::stats::{PoolStats, SchedulerStats};
use crate::task::{panic_message, Step, Task, TaskContext, TaskHandle, TaskId, Work};
use crate::topology::AffinityMask;
use crate::unit::{self, ActiveSet, ProcessingUnit, UnitState};
use crossbeam::utils::Backoff;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Pool lifecycle phase.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolLifecycle {
    /// Policy and queues allocated, no threads spawned
    Initialized = 0,
    /// All units spawned and scheduling
    Running = 1,
    /// No new external submissions; waiting for global quiescence
    Draining = 2,
    /// All units joined
    Stopped = 3,
}

impl PoolLifecycle {
    fn from_u8(value: u8) -> PoolLifecycle {
        match value {
            0 => PoolLifecycle::Initialized,
            1 => PoolLifecycle::Running,
            2 => PoolLifecycle::Draining,
            _ => PoolLifecycle::Stopped,
        }
    }
}

/// What a completed drain left behind.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// Tasks that completed with a result over the pool's lifetime
    pub completed: u64,

    /// Tasks that completed with a captured fault
    pub failed: u64,

    /// Tasks still Suspended at quiescence. These never received their wake:
    /// a caller bug, surfaced here instead of masked.
    pub leaked_suspended: Vec<TaskId>,

    /// Wall time the drain took
    pub elapsed: Duration,
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Shared pool state; worker threads hold this, the `WorkerThreadPool`
/// facade owns the join handles.
pub(crate) struct PoolCore {
    id: u64,
    name: String,
    policy: SchedulingPolicy,
    pub(crate) units: Vec<Arc<ProcessingUnit>>,
    active: Arc<ActiveSet>,

    mode: AtomicU32,
    lifecycle: AtomicU8,
    /// Set only after quiescence holds; releases Stopping units to exit
    halt: AtomicBool,

    /// Tasks queued in the policy
    pending: AtomicUsize,
    /// Tasks executing on a unit
    running: AtomicUsize,
    /// Tasks parked with an external primitive
    suspended: AtomicUsize,
    /// Bumped on every arrival (submission or wake)
    epoch: AtomicU64,

    pub(crate) stats: PoolStats,
    /// Suspended tasks by id, for the shutdown diagnostic
    suspended_tasks: DashMap<TaskId, Arc<Task>>,

    /// Serializes suspend/resume so the active-count invariant holds
    elastic_lock: Mutex<()>,

    options: RuntimeOptions,
}

impl PoolCore {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    pub(crate) fn mode(&self) -> SchedulerMode {
        SchedulerMode::from_bits(self.mode.load(Ordering::Acquire))
    }

    pub(crate) fn lifecycle(&self) -> PoolLifecycle {
        PoolLifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    fn lifecycle_cas(&self, from: PoolLifecycle, to: PoolLifecycle) -> bool {
        self.lifecycle
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn halted(&self) -> bool {
        self.halt.load(Ordering::Acquire)
    }

    pub(crate) fn idle_backoff(&self) -> Duration {
        self.options.idle_backoff
    }

    /// Insert a task as Pending and wake an idle unit. The epoch bump makes
    /// the arrival visible to a drain check already in flight.
    fn enqueue(&self, task: Arc<Task>, hint: Option<usize>) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.policy.push(task, hint);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.notify_idle();
    }

    fn notify_idle(&self) {
        for unit in &self.units {
            if unit.is_parked() {
                unit.signal();
                return;
            }
        }
    }

    /// Claim one task for `unit`: own structure first, then whatever the
    /// policy lets this unit reach.
    pub(crate) fn claim(&self, unit: usize) -> Option<Arc<Task>> {
        if let Some(task) = self.policy.pop(unit) {
            self.running.fetch_add(1, Ordering::SeqCst);
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Some(task);
        }
        let task = self.policy.try_steal(unit)?;
        self.running.fetch_add(1, Ordering::SeqCst);
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.stats.stolen();
        Some(task)
    }

    /// Execute one claimed task to completion or suspension.
    pub(crate) fn run_one(self: &Arc<Self>, unit: usize, task: &Arc<Task>) {
        if task.try_activate().is_err() {
            // a Completed task was re-queued; a task runs at most once
            #[cfg(debug_assertions)]
            eprintln!(
                "strand worker {}/{}: refusing to re-run completed {}",
                self.name, unit, task.id()
            );
            self.running.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        task.set_last_pool(Arc::downgrade(self));

        let Some(mut work) = task.take_work() else {
            task.complete(Err(TaskError::AlreadyCompleted));
            self.running.fetch_sub(1, Ordering::SeqCst);
            return;
        };

        let outcome = {
            let mut ctx = TaskContext::new(task, self, unit);
            panic::catch_unwind(AssertUnwindSafe(|| work(&mut ctx)))
        };

        match outcome {
            Ok(Step::Complete(value)) => {
                task.complete(Ok(value));
                self.stats.completed();
            }
            Ok(Step::Suspend) => {
                task.restore_work(work);
                self.suspended.fetch_add(1, Ordering::SeqCst);
                self.suspended_tasks.insert(task.id(), Arc::clone(task));
                task.mark_suspended();
                // A wake that raced the suspension parked its request in the
                // early-wake flag; honor it now.
                if task.take_early_wake() {
                    let _ = self.wake(task);
                }
            }
            Err(payload) => {
                let message = panic_message(payload);
                #[cfg(debug_assertions)]
                eprintln!(
                    "strand worker {}/{}: {} panicked: {}",
                    self.name, unit, task.id(), message
                );
                task.complete(Err(TaskError::Panicked(message)));
                self.stats.failed();
            }
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    /// Suspended→Pending and re-queue into this pool. See
    /// [`crate::task::WakeHandle::wake`] for the result contract.
    pub(crate) fn wake(self: &Arc<Self>, task: &Arc<Task>) -> Result<bool, PoolError> {
        use crate::task::TaskState;

        if self.lifecycle() == PoolLifecycle::Stopped {
            return Err(PoolError::PoolStopped {
                pool: self.name.clone(),
            });
        }

        let mut flagged = false;
        loop {
            match task.state() {
                TaskState::Suspended => {
                    if task.try_wake() {
                        // release the suspension bookkeeping of whichever
                        // pool parked the task
                        self.pending.fetch_add(1, Ordering::SeqCst);
                        if let Some(origin) = task.last_pool().upgrade() {
                            if origin.suspended_tasks.remove(&task.id()).is_some() {
                                origin.suspended.fetch_sub(1, Ordering::SeqCst);
                            }
                        }
                        self.policy.push(Arc::clone(task), unit::current_unit_for(self.id));
                        self.epoch.fetch_add(1, Ordering::SeqCst);
                        self.stats.woken();
                        self.notify_idle();
                        return Ok(true);
                    }
                    // lost the CAS to a racing wake or suspension step
                }
                TaskState::Active => {
                    // still running on a unit; leave the wake request for
                    // the owning worker to honor as it parks the task
                    task.set_early_wake();
                    flagged = true;
                    if task.state() != TaskState::Suspended {
                        return Ok(true);
                    }
                }
                TaskState::Pending | TaskState::Completed => return Ok(flagged),
            }
        }
    }

    /// Re-drain a freshly suspended unit's queue. The control-plane drain in
    /// `suspend_processing_unit` can race a push that had already routed to
    /// this unit; the unit repeats the drain as it parks, so nothing is left
    /// stranded in its private queue.
    pub(crate) fn remigrate(&self, unit: usize) {
        if !self.policy.kind().migrates_on_suspend() {
            return;
        }
        let orphans = self.policy.drain_unit(unit);
        if !orphans.is_empty() {
            self.stats.migrated(orphans.len() as u64);
            for task in orphans {
                self.policy.push(task, None);
            }
            self.notify_idle();
        }
    }

    /// DELAY_EXIT grace period: spin briefly re-checking for arrivals
    /// before a unit advertises itself as stoppable.
    pub(crate) fn linger(&self) -> bool {
        let backoff = Backoff::new();
        let deadline = Instant::now() + Duration::from_micros(200);
        while Instant::now() < deadline {
            if self.pending.load(Ordering::SeqCst) > 0 {
                return true;
            }
            backoff.snooze();
        }
        false
    }

    /// The quiescence predicate: every unit simultaneously Stopping with
    /// nothing pending and nothing running, re-validated against the epoch
    /// so an arrival mid-check restarts the snapshot.
    fn is_quiescent(&self) -> bool {
        let before = self.epoch.load(Ordering::SeqCst);
        if self.pending.load(Ordering::SeqCst) != 0 || self.running.load(Ordering::SeqCst) != 0 {
            return false;
        }
        if !self
            .units
            .iter()
            .all(|unit| unit.state() == UnitState::Stopping)
        {
            return false;
        }
        self.epoch.load(Ordering::SeqCst) == before
    }
}

/// A named group of processing units sharing one scheduling policy.
pub struct WorkerThreadPool {
    core: Arc<PoolCore>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThreadPool")
            .field("name", &self.core.name)
            .field("units", &self.core.units.len())
            .finish()
    }
}

impl WorkerThreadPool {
    /// Create a pool with default options and no affinity binding.
    pub fn new(name: &str, kind: PolicyKind, units: usize) -> Self {
        Self::with_options(name, kind, units, None, RuntimeOptions::default())
    }

    /// Create a pool with explicit options and an optional hardware-context
    /// binding (one context per unit, in mask order).
    pub fn with_options(
        name: &str,
        kind: PolicyKind,
        units: usize,
        affinity: Option<AffinityMask>,
        options: RuntimeOptions,
    ) -> Self {
        assert!(units > 0, "a pool needs at least one unit");

        let contexts: Vec<Option<usize>> = match &affinity {
            Some(mask) => (0..units).map(|i| mask.contexts().get(i).copied()).collect(),
            None => vec![None; units],
        };

        let active = Arc::new(ActiveSet::new(units));
        let core = Arc::new(PoolCore {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            policy: SchedulingPolicy::new(kind, units, Arc::clone(&active)),
            units: contexts
                .into_iter()
                .enumerate()
                .map(|(index, context)| Arc::new(ProcessingUnit::new(index, context)))
                .collect(),
            active,
            mode: AtomicU32::new(SchedulerMode::DEFAULT.bits()),
            lifecycle: AtomicU8::new(PoolLifecycle::Initialized as u8),
            halt: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            suspended: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
            stats: PoolStats::default(),
            suspended_tasks: DashMap::new(),
            elastic_lock: Mutex::new(()),
            options,
        });

        Self {
            core,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn core(&self) -> &Arc<PoolCore> {
        &self.core
    }

    /// The pool's name
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// The queue discipline this pool runs
    pub fn kind(&self) -> PolicyKind {
        self.core.policy.kind()
    }

    /// Number of processing units, fixed for the pool's lifetime
    pub fn unit_count(&self) -> usize {
        self.core.units.len()
    }

    /// Current lifecycle phase
    pub fn lifecycle(&self) -> PoolLifecycle {
        self.core.lifecycle()
    }

    /// Units not suspended (nor suspending)
    pub fn get_active_os_thread_count(&self) -> usize {
        self.core.active.count()
    }

    /// Current scheduler mode flags
    pub fn scheduler_mode(&self) -> SchedulerMode {
        self.core.mode()
    }

    /// Atomically replace the scheduler mode flags. Worker loops observe the
    /// change on their next iteration.
    pub fn set_scheduler_mode(&self, mode: SchedulerMode) {
        self.core.mode.store(mode.bits(), Ordering::Release);
    }

    /// Snapshot of the scheduling counters
    pub fn stats(&self) -> SchedulerStats {
        self.core.stats.snapshot()
    }

    /// Initialized→Running: spawn one OS thread per unit. Idempotent while
    /// Running; fails once the pool has begun draining.
    pub fn run(&self) -> Result<(), PoolError> {
        if !self.core.lifecycle_cas(PoolLifecycle::Initialized, PoolLifecycle::Running) {
            return match self.core.lifecycle() {
                PoolLifecycle::Running => Ok(()),
                _ => Err(PoolError::PoolStopped {
                    pool: self.core.name.clone(),
                }),
            };
        }

        let mut handles = self.handles.lock();
        for index in 0..self.core.units.len() {
            let core = Arc::clone(&self.core);
            let handle = thread::Builder::new()
                .name(format!("strand-{}-{}", self.core.name, index))
                .spawn(move || unit::worker_loop(core, index))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        Ok(())
    }

    /// Submit a one-shot closure as a task.
    pub fn spawn<T, F>(&self, priority: Priority, f: F) -> Result<TaskHandle<T>, PoolError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let mut slot = Some(f);
        self.spawn_resumable(priority, move |_ctx: &mut TaskContext<'_>| match slot.take() {
            Some(f) => Step::Complete(Box::new(f())),
            // unreachable: completed tasks are never re-entered
            None => Step::Complete(Box::new(())),
        })
    }

    /// Submit a resumable step closure. The closure runs to
    /// [`Step::Complete`] or parks itself with [`Step::Suspend`] after
    /// handing off a wake handle from the context.
    pub fn spawn_resumable<T, F>(
        &self,
        priority: Priority,
        work: F,
    ) -> Result<TaskHandle<T>, PoolError>
    where
        T: Send + 'static,
        F: FnMut(&mut TaskContext<'_>) -> Step + Send + 'static,
    {
        match self.core.lifecycle() {
            PoolLifecycle::Initialized | PoolLifecycle::Running => {}
            PoolLifecycle::Draining => {
                return Err(PoolError::PoolDraining {
                    pool: self.core.name.clone(),
                })
            }
            PoolLifecycle::Stopped => {
                return Err(PoolError::PoolStopped {
                    pool: self.core.name.clone(),
                })
            }
        }

        let task = Arc::new(Task::new(priority, Box::new(work) as Work));
        // wakes delivered before the first run still find their way home
        task.set_last_pool(Arc::downgrade(&self.core));
        self.core.stats.submitted();
        self.core
            .enqueue(Arc::clone(&task), unit::current_unit_for(self.core.id));
        Ok(TaskHandle::new(task))
    }

    /// Active→Suspending→Suspended for one unit. The unit finishes its
    /// in-flight task, then parks on its idle signal. Policies whose unit
    /// queues are unreachable from peers hand the backlog back to the
    /// remaining active units; static policies refuse outright.
    pub fn suspend_processing_unit(&self, index: usize) -> Result<(), PoolError> {
        let core = &self.core;
        if index >= core.units.len() {
            return Err(PoolError::InvalidUnitIndex {
                index,
                count: core.units.len(),
            });
        }
        match core.lifecycle() {
            PoolLifecycle::Running => {}
            PoolLifecycle::Initialized => {
                return Err(PoolError::NotRunning {
                    pool: core.name.clone(),
                })
            }
            PoolLifecycle::Draining => {
                return Err(PoolError::PoolDraining {
                    pool: core.name.clone(),
                })
            }
            PoolLifecycle::Stopped => {
                return Err(PoolError::PoolStopped {
                    pool: core.name.clone(),
                })
            }
        }
        if !core.mode().contains(SchedulerMode::ENABLE_ELASTICITY) {
            return Err(PoolError::ElasticityDisabled {
                pool: core.name.clone(),
            });
        }
        let kind = core.policy.kind();
        if !kind.suspendable() {
            // fixed assignment: work already bound to this unit, and work
            // bound to it in the future, would become unreachable
            return Err(PoolError::UnsupportedBySchedulingPolicy {
                policy: kind.name().to_string(),
            });
        }

        let _guard = core.elastic_lock.lock();

        if core.active.count() <= 1 && core.active.is_active(index) {
            return Err(PoolError::LastActiveUnit {
                pool: core.name.clone(),
            });
        }

        let unit = &core.units[index];
        if !unit.try_transition(UnitState::Active, UnitState::Suspending) {
            return match unit.state() {
                UnitState::Suspending | UnitState::Suspended => {
                    Err(PoolError::AlreadySuspended { index })
                }
                _ => Err(PoolError::NotActive { index }),
            };
        }

        // stop routing new work to this unit before touching its backlog
        core.active.deactivate(index);
        core.remigrate(index);

        unit.signal();
        Ok(())
    }

    /// Suspended→Resuming→Active. Also accepts a unit still mid-suspension,
    /// so suspend-then-resume cannot wedge on the transition window.
    pub fn resume_processing_unit(&self, index: usize) -> Result<(), PoolError> {
        let core = &self.core;
        if index >= core.units.len() {
            return Err(PoolError::InvalidUnitIndex {
                index,
                count: core.units.len(),
            });
        }
        match core.lifecycle() {
            PoolLifecycle::Running | PoolLifecycle::Draining => {}
            PoolLifecycle::Initialized => {
                return Err(PoolError::NotRunning {
                    pool: core.name.clone(),
                })
            }
            PoolLifecycle::Stopped => {
                return Err(PoolError::PoolStopped {
                    pool: core.name.clone(),
                })
            }
        }

        let _guard = core.elastic_lock.lock();

        let unit = &core.units[index];
        if unit.try_transition(UnitState::Suspended, UnitState::Resuming)
            || unit.try_transition(UnitState::Suspending, UnitState::Resuming)
        {
            core.active.activate(index);
            unit.signal();
            Ok(())
        } else {
            Err(PoolError::NotSuspended { index })
        }
    }

    /// Running→Draining→Stopped. Blocks until global quiescence, then joins
    /// every worker thread. On watchdog expiry the threads are left running
    /// and the fault is returned; live state is never silently joined over.
    pub fn stop(&self) -> Result<ShutdownReport, ShutdownError> {
        let core = &self.core;
        let started = Instant::now();

        // Never-started pools have nothing to drain
        if core.lifecycle_cas(PoolLifecycle::Initialized, PoolLifecycle::Stopped) {
            return Ok(self.report(started));
        }
        if !core.lifecycle_cas(PoolLifecycle::Running, PoolLifecycle::Draining) {
            // already draining or stopped; idempotent no-op
            return Ok(self.report(started));
        }

        // wake every parked unit so it observes the drain
        for unit in &core.units {
            unit.signal();
        }

        let deadline = started + core.options.shutdown_timeout;
        while !core.is_quiescent() {
            if Instant::now() > deadline {
                return Err(ShutdownError::QuiescenceTimeout {
                    pool: core.name.clone(),
                    pending: core.pending.load(Ordering::SeqCst),
                    running: core.running.load(Ordering::SeqCst),
                    unit_states: core.units.iter().map(|unit| unit.state()).collect(),
                    waited: core.options.shutdown_timeout,
                });
            }
            thread::sleep(Duration::from_micros(200));
        }

        core.halt.store(true, Ordering::SeqCst);
        for unit in &core.units {
            unit.signal();
        }

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }

        core.lifecycle
            .store(PoolLifecycle::Stopped as u8, Ordering::Release);
        Ok(self.report(started))
    }

    fn report(&self, started: Instant) -> ShutdownReport {
        let stats = self.core.stats.snapshot();
        ShutdownReport {
            completed: stats.completed,
            failed: stats.failed,
            leaked_suspended: self
                .core
                .suspended_tasks
                .iter()
                .map(|entry| *entry.key())
                .collect(),
            elapsed: started.elapsed(),
        }
    }
}

impl Drop for WorkerThreadPool {
    fn drop(&mut self) {
        if self.core.lifecycle() == PoolLifecycle::Running {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elastic(pool: &WorkerThreadPool) {
        pool.set_scheduler_mode(SchedulerMode::DEFAULT | SchedulerMode::ENABLE_ELASTICITY);
    }

    #[test]
    fn test_pool_creation() {
        let pool = WorkerThreadPool::new("default", PolicyKind::AbpPriority, 4);
        assert_eq!(pool.name(), "default");
        assert_eq!(pool.kind(), PolicyKind::AbpPriority);
        assert_eq!(pool.unit_count(), 4);
        assert_eq!(pool.lifecycle(), PoolLifecycle::Initialized);
        assert_eq!(pool.get_active_os_thread_count(), 4);
    }

    #[test]
    fn test_run_is_idempotent() {
        let pool = WorkerThreadPool::new("default", PolicyKind::Local, 2);
        pool.run().unwrap();
        pool.run().unwrap();
        assert_eq!(pool.lifecycle(), PoolLifecycle::Running);
        pool.stop().unwrap();

        // a stopped pool cannot be restarted
        assert!(pool.run().is_err());
    }

    #[test]
    fn test_spawn_and_wait() {
        let pool = WorkerThreadPool::new("default", PolicyKind::AbpPriority, 2);
        pool.run().unwrap();

        let handle = pool.spawn(Priority::Normal, || 2 + 2).unwrap();
        assert_eq!(handle.wait().unwrap(), 4);

        pool.stop().unwrap();
    }

    #[test]
    fn test_spawn_before_run_is_queued() {
        let pool = WorkerThreadPool::new("default", PolicyKind::Local, 1);
        let handle = pool.spawn(Priority::Normal, || "queued").unwrap();

        pool.run().unwrap();
        assert_eq!(handle.wait().unwrap(), "queued");
        pool.stop().unwrap();
    }

    #[test]
    fn test_panic_is_captured_and_worker_survives() {
        // the worker that ran the panicking task must keep scheduling
        let pool = WorkerThreadPool::new("default", PolicyKind::Local, 1);
        pool.run().unwrap();

        let bad: TaskHandle<()> = pool.spawn(Priority::Normal, || panic!("boom")).unwrap();
        assert_eq!(
            bad.wait(),
            Err(TaskError::Panicked("boom".to_string()))
        );

        let good = pool.spawn(Priority::Normal, || 1).unwrap();
        assert_eq!(good.wait().unwrap(), 1);

        let report = pool.stop().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 1);
    }

    #[test]
    fn test_suspend_requires_elasticity_flag() {
        let pool = WorkerThreadPool::new("default", PolicyKind::AbpPriority, 2);
        pool.run().unwrap();

        assert!(matches!(
            pool.suspend_processing_unit(0),
            Err(PoolError::ElasticityDisabled { .. })
        ));

        pool.stop().unwrap();
    }

    #[test]
    fn test_suspend_resume_cycle() {
        let pool = WorkerThreadPool::new("default", PolicyKind::AbpPriority, 2);
        pool.run().unwrap();
        elastic(&pool);

        pool.suspend_processing_unit(1).unwrap();
        assert_eq!(pool.get_active_os_thread_count(), 1);

        pool.resume_processing_unit(1).unwrap();
        assert_eq!(pool.get_active_os_thread_count(), 2);

        pool.stop().unwrap();
    }

    #[test]
    fn test_suspend_out_of_range() {
        let pool = WorkerThreadPool::new("default", PolicyKind::AbpPriority, 2);
        pool.run().unwrap();
        elastic(&pool);

        assert_eq!(
            pool.suspend_processing_unit(5),
            Err(PoolError::InvalidUnitIndex { index: 5, count: 2 })
        );

        pool.stop().unwrap();
    }

    #[test]
    fn test_last_active_unit_is_protected() {
        let pool = WorkerThreadPool::new("default", PolicyKind::AbpPriority, 2);
        pool.run().unwrap();
        elastic(&pool);

        pool.suspend_processing_unit(0).unwrap();
        assert!(matches!(
            pool.suspend_processing_unit(1),
            Err(PoolError::LastActiveUnit { .. })
        ));
        assert_eq!(pool.get_active_os_thread_count(), 1);

        pool.stop().unwrap();
    }

    #[test]
    fn test_submissions_rejected_after_stop() {
        let pool = Arc::new(WorkerThreadPool::new("default", PolicyKind::Local, 1));
        pool.run().unwrap();
        pool.stop().unwrap();

        assert!(matches!(
            pool.spawn(Priority::Normal, || ()),
            Err(PoolError::PoolStopped { .. })
        ));
    }

    #[test]
    fn test_stop_drains_all_pending_work() {
        // everything submitted before stop() must be complete afterwards
        let pool = WorkerThreadPool::new("default", PolicyKind::AbpPriority, 4);
        pool.run().unwrap();

        let handles: Vec<_> = (0..500)
            .map(|i| pool.spawn(Priority::Normal, move || i).unwrap())
            .collect();

        let report = pool.stop().unwrap();
        assert!(report.leaked_suspended.is_empty());
        for (i, handle) in handles.iter().enumerate() {
            assert!(handle.is_completed());
            assert_eq!(handle.wait().unwrap(), i);
        }
    }

    #[test]
    fn test_stop_is_idempotent() {
        let pool = WorkerThreadPool::new("default", PolicyKind::Local, 1);
        pool.run().unwrap();
        pool.stop().unwrap();
        pool.stop().unwrap();
        assert_eq!(pool.lifecycle(), PoolLifecycle::Stopped);
    }

    #[test]
    fn test_stats_track_completion() {
        let pool = WorkerThreadPool::new("default", PolicyKind::LocalPriorityFifo, 2);
        pool.run().unwrap();

        for _ in 0..10 {
            pool.spawn(Priority::Normal, || ()).unwrap().wait().unwrap();
        }
        pool.stop().unwrap();

        let stats = pool.stats();
        assert_eq!(stats.submitted, 10);
        assert_eq!(stats.completed, 10);
        assert_eq!(stats.failed, 0);
    }
}
