//! strand: command-line harness for the strand scheduling runtime.
//!
//! Builds a resource partitioner from process arguments plus `key=value`
//! runtime options, runs a synthetic workload through it, and prints the
//! per-pool scheduling counters. Doubles as the repository's smoke harness:
//!
//! ```text
//! strand --policy abp_priority --threads 4 --tasks 100000 --suspend 3
//! strand --pools pools.toml --option shutdown_timeout_ms=5000
//! ```

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use strand_engine::{
    PolicyKind, Priority, ResourcePartitioner, RuntimeOptions, SchedulerMode, WorkerThreadPool,
};

#[derive(Parser)]
#[command(name = "strand", version, about = "Elastic task scheduling runtime harness")]
struct Args {
    /// Scheduling policy for the default pool
    #[arg(long, default_value = "abp_priority")]
    policy: String,

    /// Unit count for the default pool (defaults to the hardware concurrency)
    #[arg(long)]
    threads: Option<usize>,

    /// Number of synthetic tasks to submit
    #[arg(long, default_value_t = 100_000)]
    tasks: usize,

    /// Priority band for the synthetic tasks
    #[arg(long, default_value = "normal")]
    priority: String,

    /// Units to suspend before submitting (exercises elastic scaling)
    #[arg(long, default_value_t = 0)]
    suspend: usize,

    /// Additional runtime options as key=value pairs
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// TOML file describing extra pools to create alongside the default
    #[arg(long)]
    pools: Option<PathBuf>,
}

/// `[[pool]]` entries of the `--pools` file.
#[derive(Debug, Deserialize)]
struct PoolFile {
    #[serde(default)]
    pool: Vec<PoolSpec>,
}

#[derive(Debug, Deserialize)]
struct PoolSpec {
    name: String,
    policy: String,
    units: Option<usize>,
}

fn parse_policy(name: &str) -> Result<PolicyKind> {
    PolicyKind::from_name(name).ok_or_else(|| anyhow!("unknown scheduling policy '{}'", name))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let options = RuntimeOptions::parse_kv(&args.options).context("parsing runtime options")?;
    let policy = parse_policy(&args.policy)?;
    let priority = Priority::from_name(&args.priority)
        .ok_or_else(|| anyhow!("unknown priority band '{}'", args.priority))?;

    let threads = args
        .threads
        .or(options.os_threads)
        .unwrap_or_else(num_cpus::get);
    if args.suspend >= threads {
        bail!(
            "cannot suspend {} of {} units; at least one must stay active",
            args.suspend,
            threads
        );
    }

    let partitioner = ResourcePartitioner::with_options(options);
    partitioner
        .create_thread_pool_with("default", policy, Some(threads), None)
        .context("registering the default pool")?;

    if let Some(path) = &args.pools {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading pool spec {}", path.display()))?;
        let file: PoolFile = toml::from_str(&text)
            .with_context(|| format!("parsing pool spec {}", path.display()))?;
        for spec in file.pool {
            partitioner
                .create_thread_pool_with(&spec.name, parse_policy(&spec.policy)?, spec.units, None)
                .with_context(|| format!("registering pool '{}'", spec.name))?;
        }
    }

    partitioner
        .finalize_and_start()
        .context("starting the runtime")?;
    let pool = partitioner.get_thread_pool("default")?;

    if args.suspend > 0 {
        pool.set_scheduler_mode(
            SchedulerMode::DO_BACKGROUND_WORK
                | SchedulerMode::DELAY_EXIT
                | SchedulerMode::ENABLE_ELASTICITY,
        );
        for unit in 0..args.suspend {
            pool.suspend_processing_unit(unit)
                .with_context(|| format!("suspending unit {}", unit))?;
        }
        println!(
            "suspended {} of {} units; {} remain active",
            args.suspend,
            threads,
            pool.get_active_os_thread_count()
        );
    }

    let started = Instant::now();
    let executed = run_workload(&pool, priority, args.tasks)?;
    let report = partitioner
        .stop_all()
        .map_err(|e| anyhow!("shutdown failed: {}", e))?;
    let elapsed = started.elapsed();

    println!(
        "ran {} tasks on pool '{}' ({}) in {:.3}s",
        executed,
        pool.name(),
        pool.kind().name(),
        elapsed.as_secs_f64()
    );
    let stats = pool.stats();
    println!(
        "submitted {} completed {} failed {} stolen {} woken {} migrated {}",
        stats.submitted, stats.completed, stats.failed, stats.stolen, stats.woken, stats.migrated
    );
    for (name, shutdown) in report {
        println!(
            "pool '{}' drained in {:.3}s ({} leaked suspended)",
            name,
            shutdown.elapsed.as_secs_f64(),
            shutdown.leaked_suspended.len()
        );
    }
    Ok(())
}

/// Submit the synthetic workload and drain it through the scheduler.
fn run_workload(pool: &WorkerThreadPool, priority: Priority, tasks: usize) -> Result<usize> {
    let executed = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(tasks);

    for _ in 0..tasks {
        let executed = Arc::clone(&executed);
        let handle = pool
            .spawn(priority, move || {
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .map_err(|e| anyhow!("submission rejected: {}", e))?;
        handles.push(handle);
    }
    for handle in handles {
        handle
            .wait()
            .map_err(|e| anyhow!("task failed: {}", e))?;
    }

    Ok(executed.load(Ordering::SeqCst))
}
