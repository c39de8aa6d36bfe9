//! Per-pool scheduler mode flags.
//!
//! A small bitset that tunes worker-loop behavior only; it never changes the
//! data model. Stored in an `AtomicU32` on the pool and re-read by every
//! worker on each loop iteration, so a change is observed within one
//! scheduling quantum.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Worker-loop behavior flags for one pool.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct SchedulerMode(u32);

impl SchedulerMode {
    /// No flags set.
    pub const NONE: SchedulerMode = SchedulerMode(0);

    /// Idle units perform periodic bookkeeping (queue rebalancing) even when
    /// they hold no assigned task.
    pub const DO_BACKGROUND_WORK: SchedulerMode = SchedulerMode(1 << 0);

    /// Units waiting in the drain phase lower their OS thread priority and
    /// yield aggressively.
    pub const REDUCE_THREAD_PRIORITY: SchedulerMode = SchedulerMode(1 << 1);

    /// Units linger briefly before advertising themselves as stoppable, so a
    /// late-arriving wake is picked up without a park/unpark round trip.
    pub const DELAY_EXIT: SchedulerMode = SchedulerMode(1 << 2);

    /// Permits suspend/resume of individual processing units while the pool
    /// is running.
    pub const ENABLE_ELASTICITY: SchedulerMode = SchedulerMode(1 << 3);

    /// The mode a freshly created pool starts with.
    pub const DEFAULT: SchedulerMode = SchedulerMode::DO_BACKGROUND_WORK;

    const ALL: u32 = (1 << 4) - 1;

    /// Raw bit representation.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild from raw bits; unknown bits are dropped.
    pub fn from_bits(bits: u32) -> SchedulerMode {
        SchedulerMode(bits & Self::ALL)
    }

    /// True if every flag in `other` is set in `self`.
    pub fn contains(self, other: SchedulerMode) -> bool {
        self.0 & other.0 == other.0
    }

    /// Copy of `self` with the given flags set.
    pub fn with(self, other: SchedulerMode) -> SchedulerMode {
        SchedulerMode(self.0 | other.0)
    }

    /// Copy of `self` with the given flags cleared.
    pub fn without(self, other: SchedulerMode) -> SchedulerMode {
        SchedulerMode(self.0 & !other.0)
    }
}

impl BitOr for SchedulerMode {
    type Output = SchedulerMode;

    fn bitor(self, rhs: SchedulerMode) -> SchedulerMode {
        SchedulerMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for SchedulerMode {
    fn bitor_assign(&mut self, rhs: SchedulerMode) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for SchedulerMode {
    type Output = SchedulerMode;

    fn bitand(self, rhs: SchedulerMode) -> SchedulerMode {
        SchedulerMode(self.0 & rhs.0)
    }
}

impl fmt::Debug for SchedulerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (SchedulerMode::DO_BACKGROUND_WORK, "DO_BACKGROUND_WORK"),
            (SchedulerMode::REDUCE_THREAD_PRIORITY, "REDUCE_THREAD_PRIORITY"),
            (SchedulerMode::DELAY_EXIT, "DELAY_EXIT"),
            (SchedulerMode::ENABLE_ELASTICITY, "ENABLE_ELASTICITY"),
        ];
        let mut listed = false;
        write!(f, "SchedulerMode(")?;
        for (flag, name) in names {
            if self.contains(flag) {
                if listed {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                listed = true;
            }
        }
        if !listed {
            write!(f, "NONE")?;
        }
        write!(f, ")")
    }
}
