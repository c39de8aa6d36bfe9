//! Shutdown coordination: quiescence means no pre-stop submission is left
//! Pending or Active, and mode-flag churn during a full
//! suspend/resume/submit/stop cycle never loses work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strand_engine::{
    PolicyKind, Priority, SchedulerMode, TaskState, WorkerThreadPool,
};

#[test]
fn all_pre_stop_submissions_reach_completed() {
    for policy in [PolicyKind::AbpPriority, PolicyKind::Local, PolicyKind::Hierarchy] {
        let pool = WorkerThreadPool::new("default", policy, 4);
        pool.run().unwrap();

        let handles: Vec<_> = (0..5000)
            .map(|i| pool.spawn(Priority::Normal, move || i * 2).unwrap())
            .collect();

        let report = pool.stop().unwrap();
        assert!(report.leaked_suspended.is_empty());

        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(handle.state(), TaskState::Completed, "policy {:?}", policy);
            assert_eq!(handle.wait().unwrap(), i * 2);
        }
    }
}

#[test]
fn stop_reports_counts() {
    let pool = WorkerThreadPool::new("default", PolicyKind::AbpPriority, 2);
    pool.run().unwrap();

    for _ in 0..50 {
        pool.spawn(Priority::Normal, || ()).unwrap();
    }
    let bad: Vec<_> = (0..3)
        .map(|_| {
            pool.spawn::<(), _>(Priority::Normal, || panic!("expected fault"))
                .unwrap()
        })
        .collect();

    let report = pool.stop().unwrap();
    assert_eq!(report.completed, 50);
    assert_eq!(report.failed, 3);
    for handle in &bad {
        assert!(handle.wait().is_err());
    }
}

#[test]
fn mode_flag_churn_never_loses_work() {
    let combinations = [
        SchedulerMode::NONE,
        SchedulerMode::DO_BACKGROUND_WORK,
        SchedulerMode::ENABLE_ELASTICITY,
        SchedulerMode::DO_BACKGROUND_WORK | SchedulerMode::ENABLE_ELASTICITY,
    ];

    for mode in combinations {
        let pool = WorkerThreadPool::new("default", PolicyKind::AbpPriority, 4);
        pool.run().unwrap();
        pool.set_scheduler_mode(mode);

        let executed = Arc::new(AtomicUsize::new(0));
        for _ in 0..1000 {
            let executed = Arc::clone(&executed);
            pool.spawn(Priority::Normal, move || {
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        let elastic = mode.contains(SchedulerMode::ENABLE_ELASTICITY);
        let suspended = pool.suspend_processing_unit(3);
        assert_eq!(suspended.is_ok(), elastic, "mode {:?}", mode);

        // flip every flag mid-run; workers pick the change up on their
        // next iteration
        pool.set_scheduler_mode(
            SchedulerMode::DO_BACKGROUND_WORK
                | SchedulerMode::REDUCE_THREAD_PRIORITY
                | SchedulerMode::DELAY_EXIT
                | SchedulerMode::ENABLE_ELASTICITY,
        );

        if elastic {
            pool.resume_processing_unit(3).unwrap();
        }
        pool.suspend_processing_unit(2).unwrap();
        pool.resume_processing_unit(2).unwrap();

        let executed_after = Arc::clone(&executed);
        for _ in 0..1000 {
            let executed = Arc::clone(&executed_after);
            pool.spawn(Priority::Normal, move || {
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        let report = pool.stop().unwrap();
        assert_eq!(executed.load(Ordering::SeqCst), 2000, "mode {:?}", mode);
        assert!(report.leaked_suspended.is_empty());
    }
}

#[test]
fn drained_pool_reports_suspended_leaks() {
    use strand_engine::{Step, TaskContext};

    let pool = WorkerThreadPool::new("default", PolicyKind::AbpPriority, 2);
    pool.run().unwrap();

    // a task that parks itself and never receives its wake: a caller bug
    // the shutdown report must surface rather than mask
    let leaked: strand_engine::TaskHandle<()> = pool
        .spawn_resumable(Priority::Normal, move |ctx: &mut TaskContext<'_>| {
            let _forgotten = ctx.wake_handle();
            Step::Suspend
        })
        .unwrap();

    // let it reach Suspended before draining
    while leaked.state() != TaskState::Suspended {
        std::thread::yield_now();
    }

    let report = pool.stop().unwrap();
    assert_eq!(report.leaked_suspended, vec![leaked.id()]);
    assert_eq!(leaked.state(), TaskState::Suspended);
}
