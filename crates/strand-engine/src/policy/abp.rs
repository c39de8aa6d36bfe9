//! The `abp_priority` discipline: classic work stealing over lock-free
//! deques, one deque per unit per priority band, plus a shared injector per
//! band for external submissions.
//!
//! The owner works the LIFO end of its deque for cache locality; thieves
//! take the opposite end. Both ends are `crossbeam-deque` structures: owner
//! push/pop runs on relaxed/acquire-release orderings and the far-end steal
//! is an acquire CAS, so no lock is ever held on the hot path. The per-unit
//! mutex below exists only to make the owner deques shareable through
//! `&self`; the owning unit is the sole locker and thieves never touch it.

use crate::task::Task;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as Deque};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;

use crate::policy::Priority;

struct UnitDeques {
    bands: Vec<Mutex<Deque<Arc<Task>>>>,
}

pub(crate) struct AbpQueues {
    /// Shared entry point per band for external submissions
    injectors: Vec<Injector<Arc<Task>>>,

    /// Owner ends, indexed [unit][band]
    locals: Vec<UnitDeques>,

    /// Thief ends, indexed [unit][band]
    stealers: Vec<Vec<Stealer<Arc<Task>>>>,
}

impl AbpQueues {
    pub(crate) fn new(units: usize) -> Self {
        let mut locals = Vec::with_capacity(units);
        let mut stealers = Vec::with_capacity(units);

        for _ in 0..units {
            let mut bands = Vec::with_capacity(Priority::COUNT);
            let mut unit_stealers = Vec::with_capacity(Priority::COUNT);
            for _ in 0..Priority::COUNT {
                let deque = Deque::new_lifo();
                unit_stealers.push(deque.stealer());
                bands.push(Mutex::new(deque));
            }
            locals.push(UnitDeques { bands });
            stealers.push(unit_stealers);
        }

        Self {
            injectors: (0..Priority::COUNT).map(|_| Injector::new()).collect(),
            locals,
            stealers,
        }
    }

    pub(crate) fn push(&self, task: Arc<Task>, hint: Option<usize>) {
        let band = task.priority().index();
        match hint {
            // a worker pushing into its own pool lands on its own deque
            Some(unit) => self.locals[unit].bands[band].lock().push(task),
            None => self.injectors[band].push(task),
        }
    }

    pub(crate) fn pop(&self, unit: usize) -> Option<Arc<Task>> {
        for band in (0..Priority::COUNT).rev() {
            if let Some(task) = self.locals[unit].bands[band].lock().pop() {
                return Some(task);
            }
        }
        None
    }

    pub(crate) fn try_steal(&self, thief: usize) -> Option<Arc<Task>> {
        for band in (0..Priority::COUNT).rev() {
            if let Some(task) = self.steal_from_victims(thief, band) {
                return Some(task);
            }
            if let Some(task) = self.steal_from_injector(thief, band) {
                return Some(task);
            }
        }
        None
    }

    /// Try every peer deque in one band, starting from a random victim.
    fn steal_from_victims(&self, thief: usize, band: usize) -> Option<Arc<Task>> {
        let units = self.stealers.len();
        if units < 2 {
            return None;
        }

        let start = rand::thread_rng().gen_range(0..units);
        for offset in 0..units {
            let victim = (start + offset) % units;
            if victim == thief {
                continue;
            }
            loop {
                match self.stealers[victim][band].steal() {
                    Steal::Success(task) => return Some(task),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }
        None
    }

    /// Move a batch from the shared injector onto the thief's own deque and
    /// return the first task.
    fn steal_from_injector(&self, thief: usize, band: usize) -> Option<Arc<Task>> {
        let deque = self.locals[thief].bands[band].lock();
        loop {
            match self.injectors[band].steal_batch_and_pop(&deque) {
                Steal::Success(task) => return Some(task),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    /// Background rebalancing: pull a batch from each injector band onto the
    /// idle unit's deque without claiming anything yet.
    pub(crate) fn rebalance(&self, unit: usize) {
        for band in 0..Priority::COUNT {
            if self.injectors[band].is_empty() {
                continue;
            }
            let deque = self.locals[unit].bands[band].lock();
            let _ = self.injectors[band].steal_batch(&deque);
        }
    }
}
