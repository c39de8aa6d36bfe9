//! Strand runtime core: an elastic, user-level task scheduling runtime.
//!
//! Strand multiplexes large numbers of cooperatively-suspendable tasks onto
//! a configurable set of OS-thread-backed processing units, organized into
//! independently tunable worker pools:
//!
//! - [`ResourcePartitioner`] binds named pools to hardware execution
//!   contexts, validates the mapping, and freezes it when the runtime
//!   starts.
//! - [`WorkerThreadPool`] owns N processing units sharing one
//!   [`SchedulingPolicy`] instance and exposes elastic suspend/resume of
//!   individual units plus a coordinated drain-to-quiescence shutdown.
//! - [`TaskHandle`] is the completion side of a submission;
//!   [`WakeHandle`] is the callback a synchronization primitive invokes to
//!   re-queue a suspended task.
//!
//! ```no_run
//! use strand_engine::{PolicyKind, Priority, ResourcePartitioner};
//!
//! let partitioner = ResourcePartitioner::new();
//! partitioner.create_thread_pool("default", PolicyKind::AbpPriority)?;
//! partitioner.finalize_and_start()?;
//!
//! let pool = partitioner.get_thread_pool("default")?;
//! let handle = pool.spawn(Priority::Normal, || 6 * 7).unwrap();
//! assert_eq!(handle.wait().unwrap(), 42);
//!
//! partitioner.stop_all().unwrap();
//! # Ok::<(), strand_engine::ConfigError>(())
//! ```

pub mod config;
pub mod error;
pub mod mode;
pub mod partition;
pub mod policy;
pub mod pool;
pub mod stats;
pub mod task;
pub mod topology;
mod unit;

pub use config::RuntimeOptions;
pub use error::{ConfigError, PoolError, ShutdownError, TaskError};
pub use mode::SchedulerMode;
pub use partition::{global, install_global, ResourcePartitioner};
pub use policy::{PolicyKind, Priority, SchedulingPolicy};
pub use pool::{PoolLifecycle, ShutdownReport, WorkerThreadPool};
pub use stats::SchedulerStats;
pub use task::{Step, Task, TaskContext, TaskHandle, TaskId, TaskState, WakeHandle, Work};
pub use topology::{hardware_concurrency, AffinityMask};
pub use unit::{ProcessingUnit, UnitState};
