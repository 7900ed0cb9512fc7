//! Simulation handle, override leases and the run loop.

use crate::error::SimError;
use crate::kernel::{EdgeKind, Kernel, KernelStats, SignalId, WriteAction};
use crate::signal::{Signal, SignalValue};
use crate::time::{SimDuration, SimTime};
use crate::trigger::{Trigger, Wait};
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// Limits applied by [`Simulator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulated time after which the run is aborted.
    pub max_time: SimDuration,
    /// Delta cycles allowed within a single instant.
    pub max_deltas: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_time: SimDuration::from_ms(100),
            max_deltas: 1_000,
        }
    }
}

/// Cloneable handle to a running simulation.
///
/// Every component receives the handle explicitly; there is no global
/// simulator instance.
#[derive(Clone)]
pub struct Sim {
    kernel: Rc<RefCell<Kernel>>,
    spawner: LocalSpawner,
}

impl Sim {
    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.kernel.borrow().now()
    }

    pub fn stats(&self) -> KernelStats {
        self.kernel.borrow().stats()
    }

    /// Declare a signal with an initial value.
    pub fn signal<T: SignalValue>(&self, name: &str, init: T) -> Signal<T> {
        let id = self
            .kernel
            .borrow_mut()
            .add_signal(name, T::WIDTH, init.to_bits());
        debug!("declared signal {name} = {init:?}");
        Signal::new(id, self.clone())
    }

    /// Suspend for `delay` of simulated time.
    pub fn timer(&self, delay: SimDuration) -> Trigger {
        Trigger::new(self.clone(), Wait::Timer(delay))
    }

    /// Suspend until every write of the current instant has been committed.
    /// Nothing may be written during the settle phase.
    pub fn settle(&self) -> Trigger {
        Trigger::new(self.clone(), Wait::Settle)
    }

    /// Start a task on the simulation executor.  It runs until it completes
    /// or the simulation ends.
    pub fn spawn<F>(&self, task: F) -> Result<(), SimError>
    where
        F: Future<Output = ()> + 'static,
    {
        self.spawner.spawn_local(task)?;
        Ok(())
    }

    /// Take exclusive ownership of signal overrides.
    pub fn claim_overrides(&self, owner: &str) -> Result<OverrideLease, SimError> {
        self.kernel.borrow_mut().claim_overrides(owner)?;
        debug!("overrides claimed by {owner}");
        Ok(OverrideLease {
            sim: self.clone(),
            owner: owner.to_string(),
            touched: RefCell::new(Vec::new()),
        })
    }

    pub(crate) fn edge_trigger(&self, id: SignalId, kind: EdgeKind) -> Trigger {
        Trigger::new(self.clone(), Wait::Edge(id, kind))
    }

    pub(crate) fn with_kernel<R>(&self, f: impl FnOnce(&Kernel) -> R) -> R {
        f(&self.kernel.borrow())
    }

    pub(crate) fn with_kernel_mut<R>(&self, f: impl FnOnce(&mut Kernel) -> R) -> R {
        f(&mut self.kernel.borrow_mut())
    }
}

impl fmt::Debug for Sim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sim").field("now", &self.now()).finish()
    }
}

/// Exclusive right to force, freeze and release signals.
///
/// Dropping the lease releases every signal it touched and frees the
/// override right for the next owner.
pub struct OverrideLease {
    sim: Sim,
    owner: String,
    touched: RefCell<Vec<SignalId>>,
}

impl OverrideLease {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub(crate) fn touch(&self, id: SignalId) {
        let mut touched = self.touched.borrow_mut();
        if !touched.contains(&id) {
            touched.push(id);
        }
    }

    /// Return every overridden signal to its normal driver.  Takes effect
    /// at the next delta cycle.
    pub fn release_all(&self) {
        let ids = std::mem::take(&mut *self.touched.borrow_mut());
        if ids.is_empty() {
            return;
        }
        self.sim.with_kernel_mut(|k| {
            for id in &ids {
                k.queue_write(*id, WriteAction::Release);
            }
        });
        debug!("{} released {} override(s)", self.owner, ids.len());
    }
}

impl Drop for OverrideLease {
    fn drop(&mut self) {
        let ids = std::mem::take(self.touched.get_mut());
        match self.sim.kernel.try_borrow_mut() {
            Ok(mut kernel) => {
                for id in ids {
                    kernel.queue_write(id, WriteAction::Release);
                }
                kernel.return_overrides();
            }
            Err(_) => warn!("override lease of {} dropped while kernel busy", self.owner),
        }
    }
}

impl fmt::Debug for OverrideLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideLease")
            .field("owner", &self.owner)
            .field("touched", &self.touched.borrow().len())
            .finish()
    }
}

/// Owns the executor and drives the event loop.
pub struct Simulator {
    pool: LocalPool,
    sim: Sim,
    config: SimConfig,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        let pool = LocalPool::new();
        let sim = Sim {
            kernel: Rc::new(RefCell::new(Kernel::new())),
            spawner: pool.spawner(),
        };
        Self { pool, sim, config }
    }

    /// Handle for declaring signals and spawning tasks before the run.
    pub fn handle(&self) -> Sim {
        self.sim.clone()
    }

    /// Run until `main` completes.  Tasks still pending at that point are
    /// dropped together with the simulator.
    pub fn run<F>(mut self, main: F) -> Result<F::Output, SimError>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&output);
        self.sim.spawn(async move {
            let value = main.await;
            *slot.borrow_mut() = Some(value);
        })?;

        let limit = SimTime::ZERO + self.config.max_time;
        loop {
            self.pool.run_until_stalled();
            if let Some(value) = output.borrow_mut().take() {
                let stats = self.sim.stats();
                debug!(
                    "simulation finished at {}: {} instants, {} deltas, {} writes",
                    self.sim.now(),
                    stats.instants,
                    stats.deltas,
                    stats.writes
                );
                return Ok(value);
            }

            let mut kernel = self.sim.kernel.borrow_mut();
            if kernel.commit(self.config.max_deltas)? {
                continue;
            }
            if kernel.open_settle() {
                continue;
            }
            match kernel.advance(self.config.max_deltas)? {
                Some(at) if at > limit => return Err(SimError::TimeLimit { limit }),
                Some(_) => {}
                None => return Err(SimError::Stalled { at: kernel.now() }),
            }
        }
    }
}
