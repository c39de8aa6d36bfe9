//! The resource partitioner: the process-wide registry that binds named
//! worker pools to hardware execution contexts.
//!
//! Two-phase lifecycle, enforced at runtime rather than by convention: a
//! mutable registration phase, then a frozen phase entered the instant
//! `finalize_and_start` runs. Every validation failure is fatal to startup
//! and reported with the requested-versus-available numbers; nothing is
//! silently defaulted.

use crate::config::RuntimeOptions;
use crate::error::{ConfigError, ShutdownError};
use crate::policy::PolicyKind;
use crate::pool::{ShutdownReport, WorkerThreadPool};
use crate::topology::{self, AffinityMask};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
enum Phase {
    Registering = 0,
    Running = 1,
    Stopped = 2,
}

impl Phase {
    fn from_u8(value: u8) -> Phase {
        match value {
            0 => Phase::Registering,
            1 => Phase::Running,
            _ => Phase::Stopped,
        }
    }
}

/// One registered pool, before the runtime starts.
#[derive(Debug, Clone)]
struct PoolRegistration {
    name: String,
    kind: PolicyKind,
    /// Explicit unit count; `None` means "resolve at start"
    units: Option<usize>,
    affinity: Option<AffinityMask>,
}

impl PoolRegistration {
    /// Units this registration is guaranteed to consume, before resolution
    fn min_units(&self) -> usize {
        self.units
            .or_else(|| self.affinity.as_ref().map(AffinityMask::len))
            .unwrap_or(1)
    }
}

/// Process-wide pool registry and owner of every pool it starts.
pub struct ResourcePartitioner {
    options: RuntimeOptions,
    /// Hardware contexts available for binding
    capacity: usize,
    phase: AtomicU8,
    registered: Mutex<Vec<PoolRegistration>>,
    pools: RwLock<FxHashMap<String, Arc<WorkerThreadPool>>>,
}

impl ResourcePartitioner {
    /// Partitioner over the machine's full hardware concurrency.
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Partitioner with explicit startup options.
    pub fn with_options(options: RuntimeOptions) -> Self {
        Self {
            options,
            capacity: topology::hardware_concurrency(),
            phase: AtomicU8::new(Phase::Registering as u8),
            registered: Mutex::new(Vec::new()),
            pools: RwLock::new(FxHashMap::default()),
        }
    }

    fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// True once `finalize_and_start` has frozen the mapping.
    pub fn is_started(&self) -> bool {
        self.phase() != Phase::Registering
    }

    /// Register a pool with defaults: unit count resolved at start, no
    /// affinity binding.
    pub fn create_thread_pool(&self, name: &str, kind: PolicyKind) -> Result<(), ConfigError> {
        self.create_thread_pool_with(name, kind, None, None)
    }

    /// Register a pool with an explicit unit count and/or affinity mask.
    pub fn create_thread_pool_with(
        &self,
        name: &str,
        kind: PolicyKind,
        units: Option<usize>,
        affinity: Option<AffinityMask>,
    ) -> Result<(), ConfigError> {
        if self.phase() != Phase::Registering {
            return Err(ConfigError::AlreadyStarted);
        }

        let mut registered = self.registered.lock();

        if registered.iter().any(|reg| reg.name == name) {
            return Err(ConfigError::DuplicatePoolName {
                name: name.to_string(),
            });
        }

        if let Some(mask) = &affinity {
            if kind == PolicyKind::Hierarchy && !mask.is_contiguous() {
                return Err(ConfigError::InvalidPolicyForAffinity {
                    policy: kind.name().to_string(),
                    reason: "the queue tree mirrors one contiguous hardware-context range"
                        .to_string(),
                });
            }
            if let Some(requested) = units {
                if mask.len() < requested {
                    return Err(ConfigError::OversubscribedHardware {
                        requested,
                        available: mask.len(),
                    });
                }
            }
            for reg in registered.iter() {
                if let Some(theirs) = &reg.affinity {
                    if let Some(&context) =
                        mask.contexts().iter().find(|&&context| theirs.contains(context))
                    {
                        return Err(ConfigError::AffinityOverlap {
                            context,
                            bound_to: reg.name.clone(),
                        });
                    }
                }
            }
        }

        let registration = PoolRegistration {
            name: name.to_string(),
            kind,
            units,
            affinity,
        };

        if !self.options.allow_oversubscription {
            let requested: usize = registered
                .iter()
                .map(PoolRegistration::min_units)
                .sum::<usize>()
                + registration.min_units();
            if requested > self.capacity {
                return Err(ConfigError::OversubscribedHardware {
                    requested,
                    available: self.capacity,
                });
            }
        }

        registered.push(registration);
        Ok(())
    }

    /// Resolve every registration to a concrete unit count.
    fn resolve_counts(&self, registered: &[PoolRegistration]) -> Result<Vec<usize>, ConfigError> {
        let explicit: usize = registered
            .iter()
            .filter_map(|reg| reg.units.or_else(|| reg.affinity.as_ref().map(AffinityMask::len)))
            .sum();
        let flexible = registered
            .iter()
            .filter(|reg| reg.units.is_none() && reg.affinity.is_none())
            .count();
        let remaining = self.capacity.saturating_sub(explicit);
        let share = if flexible > 0 {
            (remaining / flexible).max(1)
        } else {
            0
        };

        let counts: Vec<usize> = registered
            .iter()
            .map(|reg| {
                if let Some(units) = reg.units {
                    units
                } else if let Some(mask) = &reg.affinity {
                    mask.len()
                } else if reg.name == "default" {
                    // os_threads sizes the default pool when nothing else does
                    self.options.os_threads.unwrap_or(share)
                } else {
                    share
                }
            })
            .collect();

        if !self.options.allow_oversubscription {
            let total: usize = counts.iter().sum();
            if total > self.capacity {
                return Err(ConfigError::OversubscribedHardware {
                    requested: total,
                    available: self.capacity,
                });
            }
        }
        Ok(counts)
    }

    /// Freeze the mapping and start every registered pool. After this call
    /// the partitioner is read-only.
    pub fn finalize_and_start(&self) -> Result<(), ConfigError> {
        let registered = self.registered.lock();
        if registered.is_empty() {
            return Err(ConfigError::NoPoolsRegistered);
        }

        // validate before freezing so a failed start stays recoverable
        let counts = self.resolve_counts(&registered)?;

        if self
            .phase
            .compare_exchange(
                Phase::Registering as u8,
                Phase::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(ConfigError::AlreadyStarted);
        }

        let mut pools = self.pools.write();
        for (registration, units) in registered.iter().zip(counts) {
            let pool = Arc::new(WorkerThreadPool::with_options(
                &registration.name,
                registration.kind,
                units,
                registration.affinity.clone(),
                self.options.clone(),
            ));
            pool.run().expect("freshly built pool failed to start");
            pools.insert(registration.name.clone(), pool);
        }
        Ok(())
    }

    /// Handle to a running pool.
    pub fn get_thread_pool(&self, name: &str) -> Result<Arc<WorkerThreadPool>, ConfigError> {
        if !self.is_started() {
            return Err(ConfigError::NotStarted);
        }
        self.pools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownPool {
                name: name.to_string(),
            })
    }

    /// Configured unit count for a pool. Constant after start; this design
    /// does not support post-start resizing.
    pub fn get_num_threads(&self, name: &str) -> Result<usize, ConfigError> {
        if self.is_started() {
            return self.get_thread_pool(name).map(|pool| pool.unit_count());
        }
        let registered = self.registered.lock();
        let registration = registered
            .iter()
            .find(|reg| reg.name == name)
            .ok_or_else(|| ConfigError::UnknownPool {
                name: name.to_string(),
            })?;
        registration
            .units
            .or_else(|| registration.affinity.as_ref().map(AffinityMask::len))
            .ok_or(ConfigError::NotStarted)
    }

    /// Drain every pool to quiescence, in registration order, and join all
    /// worker threads. The first liveness fault is returned after every pool
    /// has been given its chance to drain.
    pub fn stop_all(&self) -> Result<Vec<(String, ShutdownReport)>, ShutdownError> {
        if self
            .phase
            .compare_exchange(
                Phase::Running as u8,
                Phase::Stopped as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(Vec::new());
        }

        let order: Vec<String> = self
            .registered
            .lock()
            .iter()
            .map(|reg| reg.name.clone())
            .collect();
        let pools = self.pools.read();

        let mut reports = Vec::new();
        let mut fault = None;
        for name in order {
            if let Some(pool) = pools.get(&name) {
                match pool.stop() {
                    Ok(report) => reports.push((name, report)),
                    Err(error) => fault = fault.or(Some(error)),
                }
            }
        }
        match fault {
            Some(error) => Err(error),
            None => Ok(reports),
        }
    }
}

impl Default for ResourcePartitioner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourcePartitioner {
    fn drop(&mut self) {
        if self.phase() == Phase::Running {
            let _ = self.stop_all();
        }
    }
}

static GLOBAL: OnceCell<ResourcePartitioner> = OnceCell::new();

/// Install the process-wide partitioner instance. Fails with the rejected
/// partitioner if one is already installed.
pub fn install_global(
    partitioner: ResourcePartitioner,
) -> Result<&'static ResourcePartitioner, ResourcePartitioner> {
    GLOBAL.set(partitioner)?;
    Ok(GLOBAL.get().expect("install_global just set the cell"))
}

/// The process-wide partitioner, if one has been installed.
pub fn global() -> Option<&'static ResourcePartitioner> {
    GLOBAL.get()
}
