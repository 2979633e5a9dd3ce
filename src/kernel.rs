//! The host-facing driver: ties the store, the event accumulator, and the
//! scheduler together into a fixed per-frame phase order.
//!
//! A host process owns one `Kernel`, registers component/event types and
//! modules against it, calls [`Kernel::build`] once, then calls
//! [`Kernel::run_frame`] once per frame of its own loop. Everything else —
//! which modules are due, which provider strategy feeds them, how their
//! command buffers get played back — is internal to the scheduler and the
//! store; the host only drives the frame boundary.

use crate::config::KernelConfig;
use crate::error::Result;
use crate::events::EventAccumulator;
use crate::scheduler::{Phase, Scheduler};
use crate::store::Store;

/// Owns Live, the scheduler, and the event accumulator, and drives one
/// frame at a time through:
/// `NetworkIngest → Input → Simulation (+ fork-join) → PostSimulation →
/// Retirement & Sync Point → Harvest → Export`.
pub struct Kernel {
    store: Store,
    scheduler: Scheduler,
    accumulator: EventAccumulator,
    config: KernelConfig,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        let mut store = Store::new(config.chunk_capacity);
        store.set_frame_rate_hz(config.frame_rate_hz);
        store.set_chunk_bytes(config.chunk_bytes);
        let scheduler = Scheduler::new(config.workers, config.circuit_reset());
        let accumulator = EventAccumulator::new(config.min_history_frames, config.max_history_frames);
        Self {
            store,
            scheduler,
            accumulator,
            config,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn tick(&self) -> u64 {
        self.store.tick()
    }

    /// Finalizes system topo-sort and convoy grouping. Must be called once
    /// after every type, system, and module is registered, and before the
    /// first [`Kernel::run_frame`]. A fatal `CircularDependency` aborts
    /// start-up.
    pub fn build(&mut self) -> Result<()> {
        self.scheduler.build()
    }

    /// Drives exactly one frame through the fixed phase order.
    pub fn run_frame(&mut self) {
        self.scheduler.run_phase(Phase::NetworkIngest, &mut self.store, &self.accumulator);
        self.scheduler.run_phase(Phase::Input, &mut self.store, &self.accumulator);

        self.scheduler.run_phase(Phase::Simulation, &mut self.store, &self.accumulator);
        self.scheduler.run_frame_synced_parallel(&mut self.store, &self.accumulator);

        self.scheduler.run_phase(Phase::PostSimulation, &mut self.store, &self.accumulator);

        // Retirement & Sync Point.
        let (finished_tick, batch) = self.store.end_frame();
        self.accumulator.push(finished_tick, batch);
        self.scheduler.dispatch_async(&self.store, &self.accumulator);

        // Harvest.
        self.scheduler.harvest(&mut self.store);

        self.scheduler.run_phase(Phase::Export, &mut self.store, &self.accumulator);
    }

    /// Runs `n` frames back to back, for tests and headless hosts that
    /// don't need to interleave their own work between frames.
    pub fn run_frames(&mut self, n: usize) {
        for _ in 0..n {
            self.run_frame();
        }
    }
}
