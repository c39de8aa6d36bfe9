//! Elastic down-scaling under load: with three of four units suspended, a
//! large batch of trivial tasks must still drain to completion through the
//! single remaining unit: work destined for suspended units' structures is
//! either stealable or was never assigned to them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strand_engine::{PolicyKind, Priority, SchedulerMode, WorkerThreadPool};

const TASKS: usize = 100_000;

const POLICIES: [PolicyKind; 5] = [
    PolicyKind::Local,
    PolicyKind::LocalPriorityFifo,
    PolicyKind::LocalPriorityLifo,
    PolicyKind::AbpPriority,
    PolicyKind::Hierarchy,
];

#[test]
fn drain_completes_on_one_remaining_unit() {
    for policy in POLICIES {
        let pool = WorkerThreadPool::new("default", policy, 4);
        pool.run().unwrap();
        pool.set_scheduler_mode(
            SchedulerMode::DO_BACKGROUND_WORK
                | SchedulerMode::REDUCE_THREAD_PRIORITY
                | SchedulerMode::DELAY_EXIT
                | SchedulerMode::ENABLE_ELASTICITY,
        );

        // remove all but one unit
        for unit in 0..3 {
            pool.suspend_processing_unit(unit)
                .unwrap_or_else(|e| panic!("suspend {} under {:?}: {}", unit, policy, e));
        }
        assert_eq!(pool.get_active_os_thread_count(), 1, "policy {:?}", policy);

        let executed = Arc::new(AtomicUsize::new(0));
        for _ in 0..TASKS {
            let executed = Arc::clone(&executed);
            pool.spawn(Priority::Normal, move || {
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        let report = pool.stop().unwrap();
        assert_eq!(
            executed.load(Ordering::SeqCst),
            TASKS,
            "lost tasks under {:?}",
            policy
        );
        assert_eq!(report.failed, 0, "policy {:?}", policy);
        assert!(report.leaked_suspended.is_empty(), "policy {:?}", policy);
    }
}

#[test]
fn suspended_units_backlog_is_migrated_or_stolen() {
    // Queue work first, then suspend: whatever was already routed to the
    // suspended units must still run.
    for policy in POLICIES {
        let pool = WorkerThreadPool::new("default", policy, 4);
        pool.run().unwrap();
        pool.set_scheduler_mode(SchedulerMode::DEFAULT | SchedulerMode::ENABLE_ELASTICITY);

        let executed = Arc::new(AtomicUsize::new(0));
        for _ in 0..1000 {
            let executed = Arc::clone(&executed);
            pool.spawn(Priority::Normal, move || {
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        for unit in 0..3 {
            pool.suspend_processing_unit(unit).unwrap();
        }

        pool.stop().unwrap();
        assert_eq!(executed.load(Ordering::SeqCst), 1000, "policy {:?}", policy);
    }
}
