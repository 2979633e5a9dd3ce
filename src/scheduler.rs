//! The frame scheduler: decides which modules are due each
//! frame, on what view, and drives phase order, asynchronous dispatch, and
//! command-buffer playback.
//!
//! Synchronous systems run in topological order directly against Live.
//! Frame-synced-parallel modules fork-join against a freshly refreshed
//! replica. Asynchronous modules are spawned onto the worker pool and
//! harvested on a later frame; `std::panic::catch_unwind` keeps one
//! module's panic from taking the frame loop down with it.

use crate::bitmask::ComponentMask;
use crate::cmdbuf::{self, CommandBuffer, PlaybackStats};
use crate::component::ComponentTypeId;
use crate::error::{KernelError, Result};
use crate::events::EventAccumulator;
use crate::providers::{GdbProvider, SharedProvider, SodProvider};
use crate::store::Store;
use crate::view::View;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A named phase in the per-frame execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    NetworkIngest,
    Input,
    Simulation,
    PostSimulation,
    Export,
}

/// Phases in the order the driver runs them. `Simulation` additionally
/// hosts the frame-synced-parallel fork-join, run immediately after this
/// phase's synchronous systems (see [`Scheduler::run_frame_synced_parallel`]).
pub const PHASE_ORDER: [Phase; 5] = [
    Phase::NetworkIngest,
    Phase::Input,
    Phase::Simulation,
    Phase::PostSimulation,
    Phase::Export,
];

/// How a module's work is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Synchronous,
    FrameSyncedParallel,
    Asynchronous,
}

/// Which snapshot strategy feeds a module's view. `Direct` means no
/// provider at all — only valid for `Synchronous` systems, which read the
/// Live World itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataStrategy {
    Direct,
    Gdb,
    Sod,
    Shared,
}

/// A synchronous system's body: runs with exclusive access to Live.
pub type SyncFn = dyn FnMut(&mut Store) -> Result<()> + Send;

/// A frame-synced-parallel or asynchronous module's body: reads a view,
/// records deferred writes into a command buffer.
pub type ViewFn = dyn Fn(&View, &mut CommandBuffer) -> Result<()> + Send + Sync;

/// Per-module circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A registered synchronous system.
pub struct SyncSystem {
    pub name: String,
    pub phase: Phase,
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub frequency_hz: f64,
    pub watched_components: ComponentMask,
    pub watched_events: ComponentMask,
    pub circuit_breaker_threshold: u32,
    func: Box<SyncFn>,
    state: ModuleState,
}

impl SyncSystem {
    pub fn new(name: impl Into<String>, phase: Phase, func: Box<SyncFn>) -> Self {
        Self {
            name: name.into(),
            phase,
            before: Vec::new(),
            after: Vec::new(),
            frequency_hz: 0.0,
            watched_components: ComponentMask::empty(),
            watched_events: ComponentMask::empty(),
            circuit_breaker_threshold: 3,
            func,
            state: ModuleState::default(),
        }
    }

    pub fn before(mut self, name: impl Into<String>) -> Self {
        self.before.push(name.into());
        self
    }

    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.after.push(name.into());
        self
    }

    pub fn watching_components(mut self, mask: ComponentMask) -> Self {
        self.watched_components = mask;
        self
    }

    pub fn watching_events(mut self, mask: ComponentMask) -> Self {
        self.watched_events = mask;
        self
    }

    pub fn at_frequency(mut self, hz: f64) -> Self {
        self.frequency_hz = hz;
        self
    }
}

/// A registered frame-synced-parallel or asynchronous module.
pub struct ModuleSpec {
    pub name: String,
    pub frequency_hz: f64,
    pub watched_components: ComponentMask,
    pub watched_events: ComponentMask,
    pub required_components: ComponentMask,
    pub execution_mode: ExecutionMode,
    pub data_strategy: DataStrategy,
    pub max_expected_runtime: Duration,
    pub circuit_breaker_threshold: u32,
    func: Arc<ViewFn>,
}

impl ModuleSpec {
    fn new(name: impl Into<String>, execution_mode: ExecutionMode, data_strategy: DataStrategy, func: Arc<ViewFn>) -> Self {
        Self {
            name: name.into(),
            frequency_hz: 1.0,
            watched_components: ComponentMask::empty(),
            watched_events: ComponentMask::empty(),
            required_components: ComponentMask::empty(),
            execution_mode,
            data_strategy,
            max_expected_runtime: Duration::from_millis(16),
            circuit_breaker_threshold: 3,
            func,
        }
    }

    /// Frame-synced-parallel: always runs against a GDB replica, fork-joined
    /// on the main thread's pool while the driver waits.
    pub fn frame_synced_parallel(name: impl Into<String>, func: Arc<ViewFn>) -> Self {
        Self::new(name, ExecutionMode::FrameSyncedParallel, DataStrategy::Gdb, func)
    }

    pub fn asynchronous(name: impl Into<String>, data_strategy: DataStrategy, func: Arc<ViewFn>) -> Self {
        assert!(
            data_strategy != DataStrategy::Direct,
            "asynchronous modules must read through a provider, not Live directly"
        );
        Self::new(name, ExecutionMode::Asynchronous, data_strategy, func)
    }

    pub fn frequency_hz(mut self, hz: f64) -> Self {
        self.frequency_hz = hz;
        self
    }

    pub fn watching_components(mut self, mask: ComponentMask) -> Self {
        self.watched_components = mask;
        self
    }

    pub fn watching_events(mut self, mask: ComponentMask) -> Self {
        self.watched_events = mask;
        self
    }

    pub fn requiring_components(mut self, mask: ComponentMask) -> Self {
        self.required_components = mask;
        self
    }

    pub fn max_expected_runtime(mut self, d: Duration) -> Self {
        self.max_expected_runtime = d;
        self
    }

    pub fn circuit_breaker_threshold(mut self, n: u32) -> Self {
        self.circuit_breaker_threshold = n;
        self
    }

    /// The union of everything this module reads: used to size its
    /// provider's sync mask. Watched components are included because a
    /// module that reacts to a write usually also wants to read it.
    fn acquire_mask(&self) -> ComponentMask {
        self.required_components.union(&self.watched_components)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ModuleState {
    last_run_tick: u64,
    last_seen_tick: u64,
    circuit: CircuitStateInner,
    failure_count: u32,
}

#[derive(Debug, Clone, Copy)]
enum CircuitStateInner {
    Closed,
    Open(Instant),
    HalfOpen,
}

impl PartialEq for CircuitStateInner {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (CircuitStateInner::Closed, CircuitStateInner::Closed)
                | (CircuitStateInner::Open(_), CircuitStateInner::Open(_))
                | (CircuitStateInner::HalfOpen, CircuitStateInner::HalfOpen)
        )
    }
}
impl Eq for CircuitStateInner {}

impl Default for CircuitStateInner {
    fn default() -> Self {
        CircuitStateInner::Closed
    }
}

/// A running or completed asynchronous module invocation.
struct AsyncTask {
    slot: Arc<Mutex<Option<TaskOutcome>>>,
    started_at: Instant,
    dispatch_tick: u64,
    gave_up: bool,
}

struct TaskOutcome {
    commands: CommandBuffer,
    acquired: AcquiredView,
    success: bool,
}

/// A view handed out by one of the three provider strategies, still
/// carrying enough information to be released back to its provider.
enum AcquiredView {
    Gdb(Arc<View>),
    Sod(View),
    Shared(Arc<View>),
}

impl AcquiredView {
    fn view(&self) -> &View {
        match self {
            AcquiredView::Gdb(v) => v,
            AcquiredView::Sod(v) => v,
            AcquiredView::Shared(v) => v,
        }
    }
}

/// One provider instance shared by every module in a convoy group. A group
/// with a single member degenerates to a dedicated provider for that
/// module.
enum ProviderGroup {
    Gdb(GdbProvider),
    Sod(SodProvider),
    Shared(SharedProvider),
}

impl ProviderGroup {
    fn acquire(&self, store: &Store, accumulator: &EventAccumulator, mask: &ComponentMask, last_seen_tick: u64) -> AcquiredView {
        match self {
            ProviderGroup::Gdb(p) => AcquiredView::Gdb(p.acquire(store, accumulator, mask, last_seen_tick)),
            ProviderGroup::Sod(p) => AcquiredView::Sod(p.acquire(store, accumulator, mask, last_seen_tick)),
            ProviderGroup::Shared(p) => {
                p.try_refresh(store, accumulator, mask, last_seen_tick);
                AcquiredView::Shared(p.acquire())
            }
        }
    }

    fn release(&self, view: AcquiredView) {
        match (self, view) {
            (ProviderGroup::Gdb(p), AcquiredView::Gdb(v)) => p.release(v),
            (ProviderGroup::Sod(p), AcquiredView::Sod(v)) => p.release(v),
            (ProviderGroup::Shared(p), AcquiredView::Shared(v)) => p.release(v),
            _ => unreachable!("acquired view kind always matches its owning group"),
        }
    }
}

/// Key grouping modules into one convoy provider: identical execution mode,
/// data strategy, and declared frequency share one refresh.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct ConvoyKey {
    mode: u8,
    strategy: DataStrategy,
    frequency_bits: u64,
}

fn convoy_key(spec: &ModuleSpec) -> ConvoyKey {
    ConvoyKey {
        mode: match spec.execution_mode {
            ExecutionMode::Synchronous => 0,
            ExecutionMode::FrameSyncedParallel => 1,
            ExecutionMode::Asynchronous => 2,
        },
        strategy: spec.data_strategy,
        frequency_bits: spec.frequency_hz.to_bits(),
    }
}

struct ModuleEntry {
    spec: ModuleSpec,
    state: ModuleState,
    task: Option<AsyncTask>,
    group: usize, // index into Scheduler::groups
}

/// Decides, each frame, which modules run, on what view, and plays back
/// their command buffers. Owns the worker pool backing asynchronous and
/// frame-synced-parallel dispatch.
pub struct Scheduler {
    systems: Vec<SyncSystem>,
    phase_order: HashMap<Phase, Vec<usize>>,
    modules: Vec<ModuleEntry>,
    groups: Vec<(ConvoyKey, ProviderGroup)>,
    pool: rayon::ThreadPool,
    reset_timeout: Duration,
    built: bool,
}

impl Scheduler {
    pub fn new(workers: usize, reset_timeout: Duration) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("kernel-worker-{i}"))
            .build()
            .expect("failed to build the kernel's worker pool");
        Self {
            systems: Vec::new(),
            phase_order: HashMap::new(),
            modules: Vec::new(),
            groups: Vec::new(),
            pool,
            reset_timeout,
            built: false,
        }
    }

    pub fn register_system(&mut self, system: SyncSystem) {
        assert!(!self.built, "cannot register systems after build()");
        self.systems.push(system);
    }

    pub fn register_module(&mut self, spec: ModuleSpec) {
        assert!(!self.built, "cannot register modules after build()");
        self.modules.push(ModuleEntry {
            spec,
            state: ModuleState::default(),
            task: None,
            group: usize::MAX,
        });
    }

    /// Topologically sorts each phase's systems and builds one provider per
    /// convoy group. Must be called once, after all registration and before
    /// the first `Kernel::frame()`. Rejects `before`/`after` cycles.
    pub fn build(&mut self) -> Result<()> {
        for phase in PHASE_ORDER {
            let indices: Vec<usize> = self
                .systems
                .iter()
                .enumerate()
                .filter(|(_, s)| s.phase == phase)
                .map(|(i, _)| i)
                .collect();
            let order = topo_sort(&self.systems, &indices)?;
            self.phase_order.insert(phase, order);
        }

        let mut group_index: HashMap<ConvoyKey, usize> = HashMap::new();
        for entry in &mut self.modules {
            let key = convoy_key(&entry.spec);
            let idx = *group_index.entry(key).or_insert_with(|| {
                let mask = ComponentMask::empty();
                self.groups.push((key, make_provider(key.strategy, mask)));
                self.groups.len() - 1
            });
            entry.group = idx;
        }
        // Widen each group's mask to the union of its members' needs, now
        // that every module that will ever join it has been registered.
        let mut masks = vec![ComponentMask::empty(); self.groups.len()];
        for entry in &self.modules {
            masks[entry.group] = masks[entry.group].union(&entry.spec.acquire_mask());
        }
        for (i, (key, _)) in self.groups.iter().enumerate() {
            self.groups[i] = (*key, make_provider(key.strategy, masks[i]));
        }

        self.built = true;
        Ok(())
    }

    /// Runs every due synchronous system registered against `phase`, in
    /// topological order, directly against Live.
    pub fn run_phase(&mut self, phase: Phase, store: &mut Store, accumulator: &EventAccumulator) {
        let Some(order) = self.phase_order.get(&phase).cloned() else {
            return;
        };
        let now_tick = store.tick();
        for idx in order {
            let system = &mut self.systems[idx];
            if !is_due(system.frequency_hz, &system.watched_components, &system.watched_events, system.state.last_run_tick, now_tick, store, accumulator) {
                continue;
            }
            if !circuit_permits(&mut system.state.circuit, self.reset_timeout) {
                continue;
            }
            let name = system.name.clone();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (system.func)(store)));
            let success = matches!(result, Ok(Ok(())));
            match result {
                Err(payload) => tracing::error!(system = %name, "synchronous system panicked: {}", panic_message(payload)),
                Ok(Err(e)) => tracing::warn!(system = %name, error = %e, "synchronous system returned an error"),
                Ok(Ok(())) => {}
            }
            record_outcome(&mut system.state, success, system.circuit_breaker_threshold);
            system.state.last_run_tick = now_tick;
        }
    }

    /// Executes every due frame-synced-parallel module against a freshly
    /// refreshed GDB replica, fork-joined on the worker pool while the
    /// driver thread waits, then plays back their buffers immediately
    /// (still within the Simulation phase).
    pub fn run_frame_synced_parallel(&mut self, store: &mut Store, accumulator: &EventAccumulator) {
        let now_tick = store.tick();
        let reset_timeout = self.reset_timeout;
        let due: Vec<usize> = self
            .modules
            .iter_mut()
            .enumerate()
            .filter(|(_, e)| e.spec.execution_mode == ExecutionMode::FrameSyncedParallel)
            .filter(|(_, e)| {
                is_due(e.spec.frequency_hz, &e.spec.watched_components, &e.spec.watched_events, e.state.last_run_tick, now_tick, store, accumulator)
                    && circuit_permits(&mut e.state.circuit, reset_timeout)
            })
            .map(|(i, _)| i)
            .collect();
        if due.is_empty() {
            return;
        }

        // One refreshed replica per convoy group, shared by every due member.
        let mut group_views: HashMap<usize, Arc<View>> = HashMap::new();
        for &idx in &due {
            let group_idx = self.modules[idx].group;
            group_views.entry(group_idx).or_insert_with(|| {
                let (_, group) = &self.groups[group_idx];
                let mask = self.modules[idx].spec.acquire_mask();
                match group.acquire(store, accumulator, &mask, 0) {
                    AcquiredView::Gdb(v) => v,
                    _ => unreachable!("frame-synced-parallel modules always use a GDB provider"),
                }
            });
        }

        let pool = &self.pool;
        let modules = &self.modules;
        let results: Vec<(usize, CommandBuffer, bool)> = pool.install(|| {
            due.par_iter()
                .map(|&idx| {
                    let entry = &modules[idx];
                    let view = &group_views[&entry.group];
                    let mut cmdbuf = CommandBuffer::new();
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (entry.spec.func)(view, &mut cmdbuf)));
                    let success = matches!(result, Ok(Ok(())));
                    if let Err(payload) = result {
                        tracing::error!(module = %entry.spec.name, "frame-synced-parallel module panicked: {}", panic_message(payload));
                    }
                    (idx, cmdbuf, success)
                })
                .collect()
        });

        for (idx, commands, success) in results {
            let stats = cmdbuf::playback(commands, store);
            if stats.validation_failed > 0 {
                tracing::debug!(module = %self.modules[idx].spec.name, dropped = stats.validation_failed, "command validation failures during playback");
            }
            let entry = &mut self.modules[idx];
            record_outcome(&mut entry.state, success, entry.spec.circuit_breaker_threshold);
            entry.state.last_run_tick = now_tick;
        }
    }

    /// Sync point: refreshes
    /// shared-strategy groups and spawns every due, idle asynchronous
    /// module onto the worker pool with a freshly acquired view.
    pub fn dispatch_async(&mut self, store: &Store, accumulator: &EventAccumulator) {
        let now_tick = store.tick();
        let reset_timeout = self.reset_timeout;
        for idx in 0..self.modules.len() {
            if self.modules[idx].spec.execution_mode != ExecutionMode::Asynchronous {
                continue;
            }
            if self.modules[idx].task.is_some() {
                continue; // still running; not re-dispatched
            }
            let due = {
                let entry = &self.modules[idx];
                is_due(
                    entry.spec.frequency_hz,
                    &entry.spec.watched_components,
                    &entry.spec.watched_events,
                    entry.state.last_run_tick,
                    now_tick,
                    store,
                    accumulator,
                )
            };
            if !due || !circuit_permits(&mut self.modules[idx].state.circuit, reset_timeout) {
                continue;
            }

            let entry = &self.modules[idx];
            let group_idx = entry.group;
            let mask = entry.spec.acquire_mask();
            let last_seen = entry.state.last_seen_tick;
            let (_, group) = &self.groups[group_idx];
            let acquired = group.acquire(store, accumulator, &mask, last_seen);

            let func = entry.spec.func.clone();
            let slot: Arc<Mutex<Option<TaskOutcome>>> = Arc::new(Mutex::new(None));
            let slot_for_task = slot.clone();
            self.pool.spawn(move || {
                let mut cmdbuf = CommandBuffer::new();
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (func)(acquired.view(), &mut cmdbuf)));
                let success = matches!(result, Ok(Ok(())));
                if let Err(payload) = result {
                    tracing::error!("asynchronous module panicked: {}", panic_message(payload));
                }
                *slot_for_task.lock() = Some(TaskOutcome {
                    commands: cmdbuf,
                    acquired,
                    success,
                });
            });

            self.modules[idx].task = Some(AsyncTask {
                slot,
                started_at: Instant::now(),
                dispatch_tick: now_tick,
                gave_up: false,
            });
        }
    }

    /// Harvest: plays back the buffers of completed
    /// asynchronous modules and gives up waiting on ones that overran
    /// `max_expected_runtime`, without touching their (still running) task.
    pub fn harvest(&mut self, store: &mut Store) {
        for idx in 0..self.modules.len() {
            let group_idx = self.modules[idx].group;
            let Some(task) = &self.modules[idx].task else { continue };
            let outcome = task.slot.lock().take();
            match outcome {
                Some(outcome) => {
                    let gave_up = self.modules[idx].task.as_ref().unwrap().gave_up;
                    if !gave_up {
                        let stats = cmdbuf::playback(outcome.commands, store);
                        if stats.validation_failed > 0 {
                            tracing::debug!(
                                module = %self.modules[idx].spec.name,
                                dropped = stats.validation_failed,
                                "command validation failures during playback"
                            );
                        }
                        let dispatch_tick = self.modules[idx].task.as_ref().unwrap().dispatch_tick;
                        let entry = &mut self.modules[idx];
                        entry.state.last_run_tick = dispatch_tick;
                        entry.state.last_seen_tick = dispatch_tick;
                        record_outcome(&mut entry.state, outcome.success, entry.spec.circuit_breaker_threshold);
                    } else {
                        tracing::warn!(module = %self.modules[idx].spec.name, "discarding commands from a module that completed after timing out");
                    }
                    let (_, group) = &self.groups[group_idx];
                    group.release(outcome.acquired);
                    self.modules[idx].task = None;
                }
                None => {
                    let entry = &mut self.modules[idx];
                    let task = entry.task.as_mut().unwrap();
                    if !task.gave_up && task.started_at.elapsed() > entry.spec.max_expected_runtime {
                        task.gave_up = true;
                        tracing::warn!(module = %entry.spec.name, "exceeded max_expected_runtime; giving up this frame");
                        record_outcome(&mut entry.state, false, entry.spec.circuit_breaker_threshold);
                    }
                }
            }
        }
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|e| e.spec.name.as_str())
    }

    pub fn system_names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|s| s.name.as_str())
    }

    /// Index of the convoy group a named module belongs to — used by tests
    /// asserting that two modules share one provider.
    pub fn group_of(&self, module_name: &str) -> Option<usize> {
        self.modules.iter().find(|e| e.spec.name == module_name).map(|e| e.group)
    }

    #[cfg(test)]
    fn circuit_state_of(&self, module_name: &str) -> Option<CircuitState> {
        self.modules.iter().find(|e| e.spec.name == module_name).map(|e| match e.state.circuit {
            CircuitStateInner::Closed => CircuitState::Closed,
            CircuitStateInner::Open(_) => CircuitState::Open,
            CircuitStateInner::HalfOpen => CircuitState::HalfOpen,
        })
    }

    #[cfg(test)]
    fn is_module_idle(&self, module_name: &str) -> bool {
        self.modules.iter().find(|e| e.spec.name == module_name).map(|e| e.task.is_none()).unwrap_or(true)
    }

    /// Whether every asynchronous module has harvested (no task still in
    /// flight). Used by hosts/tests that want to drain outstanding work
    /// before shutting the worker pool down.
    pub fn all_async_idle(&self) -> bool {
        self.modules.iter().all(|e| e.task.is_none())
    }
}

fn make_provider(strategy: DataStrategy, mask: ComponentMask) -> ProviderGroup {
    let _ = mask; // providers take the mask per-acquire; construction itself is mask-independent
    match strategy {
        DataStrategy::Gdb => ProviderGroup::Gdb(GdbProvider::new()),
        DataStrategy::Sod => ProviderGroup::Sod(SodProvider::new()),
        DataStrategy::Shared => ProviderGroup::Shared(SharedProvider::new()),
        DataStrategy::Direct => unreachable!("Direct-strategy modules never join a convoy group"),
    }
}

/// The due predicate: timer elapsed, a watched component changed, or
/// a watched event was published since this consumer's last run.
fn is_due(
    frequency_hz: f64,
    watched_components: &ComponentMask,
    watched_events: &ComponentMask,
    last_run_tick: u64,
    now_tick: u64,
    store: &Store,
    accumulator: &EventAccumulator,
) -> bool {
    let timer_due = if frequency_hz <= 0.0 {
        true
    } else {
        // Δtick * period_per_tick >= 1/frequency_hz, period_per_tick = 1/frame_rate_hz,
        // i.e. Δtick >= frame_rate_hz / frequency_hz.
        let period_per_tick = 1.0 / store.frame_rate_hz();
        (now_tick.saturating_sub(last_run_tick)) as f64 * period_per_tick >= 1.0 / frequency_hz
    };
    let component_due = watched_components
        .iter()
        .any(|id: ComponentTypeId| store.last_write_tick_for(id).is_some_and(|t| t > last_run_tick));
    let event_due = accumulator.has_events_since(watched_events, last_run_tick);
    timer_due || component_due || event_due
}

/// Evaluates (and may transition) the breaker; returns whether execution is
/// currently permitted. `Open` transitions to `HalfOpen` once `reset_timeout`
/// elapses since it tripped, granting exactly one trial run.
fn circuit_permits(state: &mut CircuitStateInner, reset_timeout: Duration) -> bool {
    match *state {
        CircuitStateInner::Closed => true,
        CircuitStateInner::HalfOpen => true,
        CircuitStateInner::Open(opened_at) => {
            if opened_at.elapsed() >= reset_timeout {
                *state = CircuitStateInner::HalfOpen;
                true
            } else {
                false
            }
        }
    }
}

fn record_outcome(state: &mut ModuleState, success: bool, threshold: u32) {
    if success {
        state.failure_count = 0;
        state.circuit = CircuitStateInner::Closed;
    } else {
        state.failure_count += 1;
        if state.circuit == CircuitStateInner::HalfOpen || state.failure_count >= threshold {
            state.circuit = CircuitStateInner::Open(Instant::now());
        }
    }
}

/// Kahn's algorithm over declared `before`/`after` edges within one phase.
fn topo_sort(systems: &[SyncSystem], indices: &[usize]) -> Result<Vec<usize>> {
    let name_to_idx: HashMap<&str, usize> = indices.iter().map(|&i| (systems[i].name.as_str(), i)).collect();
    let mut in_degree: HashMap<usize, usize> = indices.iter().map(|&i| (i, 0)).collect();
    let mut edges: HashMap<usize, Vec<usize>> = indices.iter().map(|&i| (i, Vec::new())).collect();

    for &i in indices {
        for before_name in &systems[i].before {
            if let Some(&j) = name_to_idx.get(before_name.as_str()) {
                edges.get_mut(&i).unwrap().push(j);
                *in_degree.get_mut(&j).unwrap() += 1;
            }
        }
        for after_name in &systems[i].after {
            if let Some(&j) = name_to_idx.get(after_name.as_str()) {
                edges.get_mut(&j).unwrap().push(i);
                *in_degree.get_mut(&i).unwrap() += 1;
            }
        }
    }

    let mut ready: Vec<usize> = indices.iter().copied().filter(|i| in_degree[i] == 0).collect();
    ready.sort(); // deterministic given the same registration order
    let mut order = Vec::with_capacity(indices.len());
    while let Some(i) = ready.pop() {
        order.push(i);
        let mut newly_ready = Vec::new();
        for &j in &edges[&i] {
            let deg = in_degree.get_mut(&j).unwrap();
            *deg -= 1;
            if *deg == 0 {
                newly_ready.push(j);
            }
        }
        newly_ready.sort();
        ready.extend(newly_ready);
        ready.sort();
    }

    if order.len() != indices.len() {
        let stuck: Vec<&str> = indices
            .iter()
            .filter(|i| !order.contains(i))
            .map(|&i| systems[i].name.as_str())
            .collect();
        return Err(KernelError::CircularDependency(stuck.join(", ")));
    }
    Ok(order)
}
