//! Snapshot providers: the three strategies a module can be given for
//! reading the world without touching Live directly.
//!
//! Every provider takes the same shape (sync, then hand out an immutable
//! [`View`]) but trades off differently between staleness, memory, and how
//! many chunks get re-copied per refresh:
//!
//! - [`GdbProvider`] keeps a persistent, broad replica and resyncs it on
//!   every acquire — for a module with high frequency and/or wide data needs.
//! - [`SodProvider`] pools narrow, component-filtered snapshots and only
//!   syncs the types a module actually watches — for many infrequent,
//!   narrowly-scoped consumers.
//! - [`SharedProvider`] is the convoy strategy: one replica shared by every
//!   module in the group, refreshed only when no one currently holds it.

use crate::bitmask::ComponentMask;
use crate::events::EventAccumulator;
use crate::store::Store;
use crate::view::View;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// GDB: "global database" — a single, persistent full-world replica handed
/// out fresh (chunk-diffed against its own last snapshot) on every acquire.
pub struct GdbProvider {
    replica: ArcSwap<View>,
}

impl GdbProvider {
    pub fn new() -> Self {
        Self {
            replica: ArcSwap::from_pointee(View::new()),
        }
    }

    /// Syncs a clone of the last handed-out snapshot against Live and
    /// publishes it as the new current replica. The clone carries over the
    /// previous snapshot's chunk versions, so the resync only copies chunks
    /// that actually changed.
    pub fn acquire(
        &self,
        store: &Store,
        accumulator: &EventAccumulator,
        mask: &ComponentMask,
        last_seen_tick: u64,
    ) -> Arc<View> {
        let mut next = (**self.replica.load()).clone();
        next.sync_from_live(store, mask, accumulator, last_seen_tick);
        let next = Arc::new(next);
        self.replica.store(next.clone());
        next
    }

    /// No-op: the replica is persistent and shared by reference, there is
    /// nothing to return to a pool.
    pub fn release(&self, _view: Arc<View>) {}
}

impl Default for GdbProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// SoD: "snapshot on demand" — a pool of narrow, component-filtered views
/// reused across acquisitions rather than kept persistently in sync.
pub struct SodProvider {
    pool: Mutex<Vec<View>>,
}

impl SodProvider {
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn acquire(
        &self,
        store: &Store,
        accumulator: &EventAccumulator,
        mask: &ComponentMask,
        last_seen_tick: u64,
    ) -> View {
        let mut view = self.pool.lock().pop().unwrap_or_default();
        view.sync_from_live(store, mask, accumulator, last_seen_tick);
        view
    }

    pub fn release(&self, mut view: View) {
        view.soft_clear();
        self.pool.lock().push(view);
    }
}

impl Default for SodProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared (convoy): one replica serving every module in a convoy group.
/// Refreshed only while no member currently holds a reference to it, so a
/// burst of readers never forces back-to-back resyncs of the same data.
pub struct SharedProvider {
    replica: ArcSwap<View>,
    readers: AtomicUsize,
}

impl SharedProvider {
    pub fn new() -> Self {
        Self {
            replica: ArcSwap::from_pointee(View::new()),
            readers: AtomicUsize::new(0),
        }
    }

    /// Attempts a resync; returns `false` without touching the replica if
    /// any reader is still holding it.
    pub fn try_refresh(
        &self,
        store: &Store,
        accumulator: &EventAccumulator,
        mask: &ComponentMask,
        last_seen_tick: u64,
    ) -> bool {
        if self.readers.load(Ordering::Acquire) != 0 {
            return false;
        }
        let mut next = (**self.replica.load()).clone();
        next.sync_from_live(store, mask, accumulator, last_seen_tick);
        self.replica.store(Arc::new(next));
        true
    }

    pub fn acquire(&self) -> Arc<View> {
        self.readers.fetch_add(1, Ordering::AcqRel);
        self.replica.load_full()
    }

    pub fn release(&self, _view: Arc<View>) {
        self.readers.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn reader_count(&self) -> usize {
        self.readers.load(Ordering::Acquire)
    }
}

impl Default for SharedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Blittable, Component, ComponentTier, ComponentTypeId};

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position {
        x: f32,
    }
    impl Component for Position {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(70);
        const TYPE_NAME: &'static str = "Position";
        const TIER: ComponentTier = ComponentTier::Blittable;
    }
    unsafe impl Blittable for Position {}

    fn mask() -> ComponentMask {
        let mut m = ComponentMask::empty();
        m.set(Position::TYPE_ID);
        m
    }

    #[test]
    fn gdb_resync_reflects_live_writes() {
        let mut store = Store::new(8);
        store.register_blittable::<Position>().unwrap();
        let e = store.create_entity();
        store.set_blittable(e, Position { x: 1.0 }).unwrap();
        let acc = EventAccumulator::with_max(crate::events::MIN_HISTORY_FRAMES);

        let provider = GdbProvider::new();
        let view = provider.acquire(&store, &acc, &mask(), 0);
        assert_eq!(view.get_blittable::<Position>(e).unwrap(), Some(Position { x: 1.0 }));
        provider.release(view);

        store.set_blittable(e, Position { x: 2.0 }).unwrap();
        let view = provider.acquire(&store, &acc, &mask(), 0);
        assert_eq!(view.get_blittable::<Position>(e).unwrap(), Some(Position { x: 2.0 }));
    }

    #[test]
    fn sod_pool_reuses_released_views() {
        let mut store = Store::new(8);
        store.register_blittable::<Position>().unwrap();
        let e = store.create_entity();
        store.set_blittable(e, Position { x: 1.0 }).unwrap();
        let acc = EventAccumulator::with_max(crate::events::MIN_HISTORY_FRAMES);

        let provider = SodProvider::new();
        let view = provider.acquire(&store, &acc, &mask(), 0);
        assert_eq!(view.get_blittable::<Position>(e).unwrap(), Some(Position { x: 1.0 }));
        provider.release(view);
        assert_eq!(provider.pool.lock().len(), 1);

        let view = provider.acquire(&store, &acc, &mask(), 0);
        assert_eq!(provider.pool.lock().len(), 0);
        provider.release(view);
    }

    #[test]
    fn shared_provider_skips_refresh_while_a_reader_holds_it() {
        let mut store = Store::new(8);
        store.register_blittable::<Position>().unwrap();
        let e = store.create_entity();
        store.set_blittable(e, Position { x: 1.0 }).unwrap();
        let acc = EventAccumulator::with_max(crate::events::MIN_HISTORY_FRAMES);

        let provider = SharedProvider::new();
        assert!(provider.try_refresh(&store, &acc, &mask(), 0));
        let view = provider.acquire();
        assert_eq!(view.get_blittable::<Position>(e).unwrap(), Some(Position { x: 1.0 }));

        store.set_blittable(e, Position { x: 2.0 }).unwrap();
        assert!(!provider.try_refresh(&store, &acc, &mask(), 0));
        let stale = provider.acquire();
        assert_eq!(stale.get_blittable::<Position>(e).unwrap(), Some(Position { x: 1.0 }));
        provider.release(view);
        provider.release(stale);

        assert!(provider.try_refresh(&store, &acc, &mask(), 0));
        let fresh = provider.acquire();
        assert_eq!(fresh.get_blittable::<Position>(e).unwrap(), Some(Position { x: 2.0 }));
        provider.release(fresh);
    }
}
