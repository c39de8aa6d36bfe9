//! End-to-end partitioner runs: one configuration, every suspendable
//! policy, suspended units at shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strand_engine::{
    PolicyKind, Priority, ResourcePartitioner, RuntimeOptions, SchedulerMode,
};

#[test]
fn shutdown_with_suspended_units() {
    let policies = [
        PolicyKind::Local,
        PolicyKind::LocalPriorityFifo,
        PolicyKind::LocalPriorityLifo,
        // static policies do not support suspending units: they do not
        // steal, so an unclaimed backlog would be stranded
        PolicyKind::AbpPriority,
        PolicyKind::Hierarchy,
    ];

    for policy in policies {
        let options =
            RuntimeOptions::parse_kv(["os_threads=4", "allow_oversubscription=1"]).unwrap();
        let partitioner = ResourcePartitioner::with_options(options);
        partitioner.create_thread_pool("default", policy).unwrap();
        partitioner.finalize_and_start().unwrap();

        assert_eq!(partitioner.get_num_threads("default").unwrap(), 4);

        let pool = partitioner.get_thread_pool("default").unwrap();
        assert_eq!(pool.get_active_os_thread_count(), 4);

        pool.set_scheduler_mode(
            SchedulerMode::DO_BACKGROUND_WORK
                | SchedulerMode::REDUCE_THREAD_PRIORITY
                | SchedulerMode::DELAY_EXIT
                | SchedulerMode::ENABLE_ELASTICITY,
        );

        // remove all but one unit
        for unit in 0..3 {
            pool.suspend_processing_unit(unit).unwrap();
        }

        // schedule some dummy work
        let executed = Arc::new(AtomicUsize::new(0));
        for _ in 0..10_000 {
            let executed = Arc::clone(&executed);
            pool.spawn(Priority::Normal, move || {
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        // start shutdown
        let reports = partitioner.stop_all().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(executed.load(Ordering::SeqCst), 10_000, "policy {:?}", policy);
    }
}
