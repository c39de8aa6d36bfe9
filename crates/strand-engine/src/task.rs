//! Lightweight task representation and the suspend/resume protocol.
//!
//! A task is a resumable step closure plus the bookkeeping that lets it move
//! between policy queues, processing units, and external synchronization
//! primitives without ever blocking an OS thread. The closure is re-entered
//! from the top on every schedule; suspension is just the closure returning
//! [`Step::Suspend`] after handing a [`WakeHandle`] to whichever primitive
//! will eventually deliver the wake. Waking re-pushes the task into a policy
//! queue like any other submission; there is no separate resume path.

use crate::error::{PoolError, TaskError};
use crate::mode::SchedulerMode;
use crate::policy::Priority;
use crate::pool::{PoolCore, WorkerThreadPool};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Unique identifier for a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// State of a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Queued in a scheduling policy, waiting to be claimed
    Pending = 0,
    /// Executing on exactly one processing unit
    Active = 1,
    /// Parked with an external primitive that holds its wake handle
    Suspended = 2,
    /// Terminal: finished with a result or a captured fault
    Completed = 3,
}

impl TaskState {
    fn from_u8(value: u8) -> TaskState {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Active,
            2 => TaskState::Suspended,
            _ => TaskState::Completed,
        }
    }
}

/// What a step closure instructs its worker to do next.
pub enum Step {
    /// The task is finished; the value is delivered to the awaiting handle.
    Complete(Box<dyn Any + Send>),

    /// Park the task until an external [`WakeHandle::wake`] re-queues it.
    /// The closure must already have handed its wake handle to whichever
    /// primitive will deliver that wake, or the task never runs again.
    Suspend,
}

/// Resumable work: re-entered from the top on every schedule until it
/// returns [`Step::Complete`].
pub type Work = Box<dyn FnMut(&mut TaskContext<'_>) -> Step + Send>;

type Outcome = Result<Box<dyn Any + Send>, TaskError>;

/// A lightweight, cooperatively-suspendable unit of work.
pub struct Task {
    /// Unique identifier
    id: TaskId,

    /// Ordering key used by priority-aware policies
    priority: Priority,

    /// Current state; mutated only through CAS so wake/suspend races
    /// resolve to exactly one winner
    state: AtomicU8,

    /// Step closure; taken while Active, restored on suspension, dropped on
    /// completion
    work: Mutex<Option<Work>>,

    /// Result or fault; set exactly once, consumed by the handle
    outcome: Mutex<Option<Outcome>>,

    /// A wake that arrived while the task was still Active on a unit
    early_wake: AtomicBool,

    /// Pool that last ran the task; the default wake target
    last_pool: Mutex<Weak<PoolCore>>,

    /// Completion signalling for blocking waiters
    completion_lock: Mutex<bool>,
    completion_condvar: Condvar,
}

impl Task {
    pub(crate) fn new(priority: Priority, work: Work) -> Self {
        Self {
            id: TaskId::new(),
            priority,
            state: AtomicU8::new(TaskState::Pending as u8),
            work: Mutex::new(Some(work)),
            outcome: Mutex::new(None),
            early_wake: AtomicBool::new(false),
            last_pool: Mutex::new(Weak::new()),
            completion_lock: Mutex::new(false),
            completion_condvar: Condvar::new(),
        }
    }

    /// Get the Task's unique ID
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The ordering key this task was submitted with
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Get the current state
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn try_transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Pending→Active, claimed by exactly one unit. Fails on a task that was
    /// re-queued after completing; the worker rejects it without executing.
    pub(crate) fn try_activate(&self) -> Result<(), TaskError> {
        if self.try_transition(TaskState::Pending, TaskState::Active) {
            Ok(())
        } else {
            Err(TaskError::AlreadyCompleted)
        }
    }

    /// Active→Suspended, done by the owning unit after the closure returned
    /// [`Step::Suspend`].
    pub(crate) fn mark_suspended(&self) -> bool {
        self.try_transition(TaskState::Active, TaskState::Suspended)
    }

    /// Suspended→Pending. Exactly one of possibly many racing wakes wins.
    pub(crate) fn try_wake(&self) -> bool {
        self.try_transition(TaskState::Suspended, TaskState::Pending)
    }

    pub(crate) fn set_early_wake(&self) {
        self.early_wake.store(true, Ordering::Release);
    }

    pub(crate) fn take_early_wake(&self) -> bool {
        self.early_wake.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_work(&self) -> Option<Work> {
        self.work.lock().take()
    }

    pub(crate) fn restore_work(&self, work: Work) {
        *self.work.lock() = Some(work);
    }

    pub(crate) fn set_last_pool(&self, pool: Weak<PoolCore>) {
        *self.last_pool.lock() = pool;
    }

    pub(crate) fn last_pool(&self) -> Weak<PoolCore> {
        self.last_pool.lock().clone()
    }

    /// Move to the terminal state and release every blocked waiter. The
    /// outcome is set exactly once; a second completion attempt is dropped.
    pub(crate) fn complete(&self, outcome: Outcome) {
        {
            let mut slot = self.outcome.lock();
            if slot.is_some() {
                return;
            }
            *slot = Some(outcome);
        }
        self.state.store(TaskState::Completed as u8, Ordering::Release);
        let mut done = self.completion_lock.lock();
        *done = true;
        self.completion_condvar.notify_all();
    }

    fn take_outcome(&self) -> Result<Box<dyn Any + Send>, TaskError> {
        self.outcome.lock().take().ok_or(TaskError::ResultTaken)?
    }

    /// Block until this task completes, then consume its outcome.
    fn wait_outcome(&self) -> Result<Box<dyn Any + Send>, TaskError> {
        let mut done = self.completion_lock.lock();
        while !*done {
            self.completion_condvar.wait(&mut done);
        }
        drop(done);
        self.take_outcome()
    }

    /// Block with a timeout. On timeout the outcome is left in place and the
    /// handle remains usable.
    fn wait_outcome_timeout(&self, timeout: Duration) -> Result<Box<dyn Any + Send>, TaskError> {
        let mut done = self.completion_lock.lock();
        if !*done {
            self.completion_condvar.wait_for(&mut done, timeout);
        }
        if !*done {
            return Err(TaskError::WaitTimeout);
        }
        drop(done);
        self.take_outcome()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("state", &self.state())
            .finish()
    }
}

/// Handle for awaiting a Task's result.
///
/// Clones share the underlying task; the first successful wait consumes the
/// result and later waits see [`TaskError::ResultTaken`].
pub struct TaskHandle<T> {
    task: Arc<Task>,
    _result: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> TaskHandle<T> {
    pub(crate) fn new(task: Arc<Task>) -> Self {
        Self {
            task,
            _result: PhantomData,
        }
    }

    /// Get the task ID
    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    /// Current state of the underlying task
    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    /// True once the task reached its terminal state
    pub fn is_completed(&self) -> bool {
        self.task.state() == TaskState::Completed
    }

    /// Block until the task completes and take its result.
    pub fn wait(&self) -> Result<T, TaskError> {
        downcast(self.task.wait_outcome()?)
    }

    /// Block until the task completes or `timeout` elapses. On timeout the
    /// result stays claimable.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, TaskError> {
        downcast(self.task.wait_outcome_timeout(timeout)?)
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            _result: PhantomData,
        }
    }
}

fn downcast<T: Send + 'static>(value: Box<dyn Any + Send>) -> Result<T, TaskError> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| TaskError::ResultTypeMismatch)
}

/// The callback a synchronization primitive invokes to re-queue a suspended
/// task. Cheap to clone; safe to invoke from any thread.
#[derive(Clone)]
pub struct WakeHandle {
    task: Arc<Task>,
}

impl WakeHandle {
    pub(crate) fn new(task: Arc<Task>) -> Self {
        Self { task }
    }

    /// Get the task ID
    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    /// Wake into the pool that last ran the task, preserving locality.
    ///
    /// Returns `Ok(true)` when this call (or the in-flight suspension it
    /// raced) re-queues the task, `Ok(false)` when the task was not
    /// suspended (already queued, or already completed).
    pub fn wake(&self) -> Result<bool, PoolError> {
        let pool = self
            .task
            .last_pool()
            .upgrade()
            .ok_or(PoolError::PoolUnavailable)?;
        pool.wake(&self.task)
    }

    /// Wake into an explicitly chosen pool instead of the last-run pool.
    pub fn wake_to(&self, pool: &WorkerThreadPool) -> Result<bool, PoolError> {
        pool.core().wake(&self.task)
    }
}

/// Execution context handed to a step closure while it runs on a unit.
pub struct TaskContext<'a> {
    task: &'a Arc<Task>,
    pool: &'a Arc<PoolCore>,
    unit: usize,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(task: &'a Arc<Task>, pool: &'a Arc<PoolCore>, unit: usize) -> Self {
        Self { task, pool, unit }
    }

    /// Get the task ID
    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    /// The running task's priority
    pub fn priority(&self) -> Priority {
        self.task.priority()
    }

    /// Index of the processing unit executing this task
    pub fn unit_index(&self) -> usize {
        self.unit
    }

    /// Name of the pool executing this task
    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }

    /// The pool's current scheduler mode
    pub fn scheduler_mode(&self) -> SchedulerMode {
        self.pool.mode()
    }

    /// A wake callback for this task, to hand to whichever primitive will
    /// eventually deliver the wake before returning [`Step::Suspend`].
    pub fn wake_handle(&self) -> WakeHandle {
        WakeHandle::new(Arc::clone(self.task))
    }
}

/// Extract a printable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
