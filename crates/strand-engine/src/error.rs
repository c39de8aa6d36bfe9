//! Error taxonomies for the runtime.
//!
//! Four families, mirroring where a fault is detected and who can act on it:
//! configuration errors are fatal to startup, state-transition errors leave
//! the pool healthy, task-execution errors travel to the awaiting handle,
//! and shutdown-liveness errors report a drain that never quiesced.

use crate::unit::UnitState;
use std::time::Duration;

/// Partitioner-build-time errors. All of these are fatal to startup and are
/// never silently defaulted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A pool with this name is already registered
    #[error("thread pool '{name}' is already registered")]
    DuplicatePoolName {
        /// The offending pool name
        name: String,
    },

    /// Cumulative unit requests exceed the available hardware contexts
    #[error("requested {requested} execution contexts but only {available} are available")]
    OversubscribedHardware {
        /// Contexts requested so far, including this call
        requested: usize,
        /// Contexts the partitioner can hand out
        available: usize,
    },

    /// Two pools asked for the same hardware context
    #[error("hardware context {context} is already bound to pool '{bound_to}'")]
    AffinityOverlap {
        /// The doubly-requested context id
        context: usize,
        /// The pool that claimed it first
        bound_to: String,
    },

    /// The policy variant cannot honor the requested affinity shape
    #[error("policy '{policy}' cannot honor the requested affinity: {reason}")]
    InvalidPolicyForAffinity {
        /// Name of the rejecting policy variant
        policy: String,
        /// Why the shape is unacceptable
        reason: String,
    },

    /// `finalize_and_start` was called with zero registered pools
    #[error("cannot start a partitioner with no registered thread pools")]
    NoPoolsRegistered,

    /// The registration phase is over; the mapping is frozen
    #[error("resource partitioner is already started; the pool mapping is frozen")]
    AlreadyStarted,

    /// The pool exists but the partitioner has not been started yet
    #[error("resource partitioner has not been started yet")]
    NotStarted,

    /// No pool registered under this name
    #[error("unknown thread pool '{name}'")]
    UnknownPool {
        /// The requested pool name
        name: String,
    },

    /// Unrecognized `key=value` startup option
    #[error("unknown runtime option '{key}'")]
    UnknownOption {
        /// The unrecognized key
        key: String,
    },

    /// A startup option with a malformed value
    #[error("invalid value '{value}' for runtime option '{key}'")]
    InvalidValue {
        /// The option key
        key: String,
        /// The rejected value
        value: String,
    },
}

/// State-transition errors. The pool remains healthy after any of these; the
/// caller simply asked for a transition the current state does not permit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Unit index out of range for this pool
    #[error("processing unit {index} out of range (pool has {count} units)")]
    InvalidUnitIndex {
        /// The requested index
        index: usize,
        /// Number of units in the pool
        count: usize,
    },

    /// The unit is already suspended (or mid-suspension)
    #[error("processing unit {index} is already suspended")]
    AlreadySuspended {
        /// The unit index
        index: usize,
    },

    /// The unit is not in the Active state
    #[error("processing unit {index} is not active")]
    NotActive {
        /// The unit index
        index: usize,
    },

    /// The unit is not in the Suspended state
    #[error("processing unit {index} is not suspended")]
    NotSuspended {
        /// The unit index
        index: usize,
    },

    /// The pool's scheduling policy cannot release this unit without
    /// stranding tasks in its private queue
    #[error("scheduling policy '{policy}' does not support suspending processing units")]
    UnsupportedBySchedulingPolicy {
        /// Name of the rejecting policy variant
        policy: String,
    },

    /// Suspending this unit would leave the pool with no active units
    #[error("cannot suspend the last active processing unit of pool '{pool}'")]
    LastActiveUnit {
        /// The pool name
        pool: String,
    },

    /// Elastic scaling was requested while `ENABLE_ELASTICITY` is clear
    #[error("elasticity is disabled for pool '{pool}'")]
    ElasticityDisabled {
        /// The pool name
        pool: String,
    },

    /// The pool has not been started yet
    #[error("pool '{pool}' is not running")]
    NotRunning {
        /// The pool name
        pool: String,
    },

    /// The pool is draining; external submissions are no longer accepted
    #[error("pool '{pool}' is draining and no longer accepts submissions")]
    PoolDraining {
        /// The pool name
        pool: String,
    },

    /// The pool has been stopped
    #[error("pool '{pool}' is stopped")]
    PoolStopped {
        /// The pool name
        pool: String,
    },

    /// The pool this operation targeted no longer exists
    #[error("the target pool has been torn down")]
    PoolUnavailable,
}

/// Task-execution errors, delivered through the task's handle. These never
/// propagate into a worker loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The task's work panicked; the payload message is preserved
    #[error("task panicked: {0}")]
    Panicked(String),

    /// A Completed task was scheduled again
    #[error("task already completed; re-running is rejected")]
    AlreadyCompleted,

    /// The result was already consumed by an earlier wait
    #[error("task result was already taken")]
    ResultTaken,

    /// The handle's type parameter does not match the completed value
    #[error("task result type does not match the handle type")]
    ResultTypeMismatch,

    /// `wait_timeout` elapsed before the task completed
    #[error("timed out waiting for task completion")]
    WaitTimeout,
}

/// Shutdown-liveness errors. A drain that fails to quiesce is reported with
/// enough context to diagnose the stuck pool; threads that still reference
/// live state are never silently joined.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShutdownError {
    /// The pool never reached global quiescence within the watchdog bound
    #[error(
        "pool '{pool}' failed to quiesce within {waited:?}: \
         {pending} pending, {running} running, unit states {unit_states:?}"
    )]
    QuiescenceTimeout {
        /// The pool name
        pool: String,
        /// Tasks still queued when the watchdog fired
        pending: usize,
        /// Tasks still executing when the watchdog fired
        running: usize,
        /// Per-unit states at the time of the fault
        unit_states: Vec<UnitState>,
        /// How long the drain was given
        waited: Duration,
    },
}
