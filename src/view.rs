//! Read-only consumer-side snapshot of the live world.
//!
//! A `View` is what a scheduled module or an external reader actually
//! touches: it never mutates component data in place, and it exposes the
//! entity liveness bits and component tables as they stood at the last
//! sync point, not whatever the driver thread is doing right now.

use crate::bitmask::ComponentMask;
use crate::component::{Blittable, Component, Managed};
use crate::entity::{Entity, EntityIndex};
use crate::error::{KernelError, Result};
use crate::events::{Event, EventAccumulator, FrameEventBatch};
use crate::storage::{BlittableTable, ManagedTable, TableSet};
use crate::store::Store;
use std::sync::Arc;

/// A consumer-owned replica. Synced onto by a provider between frames;
/// everything else is read-only from the consumer's perspective.
#[derive(Clone)]
pub struct View {
    entities: EntityIndex,
    tables: TableSet,
    tick: u64,
    time: f64,
    events: Vec<Arc<FrameEventBatch>>,
    data_loss: bool,
}

impl View {
    pub fn new() -> Self {
        Self {
            entities: EntityIndex::new(),
            tables: TableSet::new(),
            tick: 0,
            time: 0.0,
            events: Vec::new(),
            data_loss: false,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulation time at this view's tick, in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn get_blittable<T: Blittable + Default>(&self, entity: Entity) -> Result<Option<T>> {
        let table = self
            .tables
            .get(T::TYPE_ID)
            .ok_or(KernelError::UnknownType(T::TYPE_ID))?;
        let table = table
            .as_any()
            .downcast_ref::<BlittableTable<T>>()
            .ok_or(KernelError::TierMismatch(T::TYPE_ID))?;
        Ok(table.get(entity))
    }

    pub fn get_managed<T: Managed>(&self, entity: Entity) -> Result<Option<Arc<T>>> {
        let table = self
            .tables
            .get(T::TYPE_ID)
            .ok_or(KernelError::UnknownType(T::TYPE_ID))?;
        let table = table
            .as_any()
            .downcast_ref::<ManagedTable<T>>()
            .ok_or(KernelError::TierMismatch(T::TYPE_ID))?;
        Ok(table.get(entity))
    }

    pub fn contains<T: Component>(&self, entity: Entity) -> bool {
        self.tables
            .get(T::TYPE_ID)
            .map(|t| t.contains(entity))
            .unwrap_or(false)
    }

    pub fn query(&self, mask: &ComponentMask) -> Vec<Entity> {
        let required: Vec<_> = mask.iter().collect();
        if required.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        let slot_count = self.entities.slot_count() as u32;
        for id in 0..slot_count {
            let entity = Entity::new(id, self.entities.current_generation(id).unwrap_or(0));
            if !self.entities.is_alive(entity) {
                continue;
            }
            if required.iter().all(|type_id| {
                self.tables
                    .get(*type_id)
                    .map(|t| t.contains(entity))
                    .unwrap_or(false)
            }) {
                out.push(entity);
            }
        }
        out
    }

    /// Every event of type `T` carried by a batch absorbed into this view
    /// since its last sync.
    pub fn consume_events<T: Event>(&self) -> impl Iterator<Item = &T> + '_ {
        self.events.iter().flat_map(|batch| batch.of::<T>().iter())
    }

    pub fn has_events<T: Event>(&self) -> bool {
        self.consume_events::<T>().next().is_some()
    }

    /// Whether this view's event window has a gap — some retired batch was
    /// pruned from the accumulator before this view (or its provider) could
    /// absorb it.
    pub fn data_loss(&self) -> bool {
        self.data_loss
    }

    /// Pulls a fresh snapshot of entities, the tables named in `mask`, and
    /// every event batch retired since `last_seen_tick`. Returns the number
    /// of component chunks actually copied.
    pub(crate) fn sync_from_live(
        &mut self,
        store: &Store,
        mask: &ComponentMask,
        accumulator: &EventAccumulator,
        last_seen_tick: u64,
    ) -> usize {
        self.entities = store.clone_entity_index();
        self.tick = store.tick();
        self.time = store.time();
        let copied = store.sync_into(&mut self.tables, mask);
        let (batches, data_loss) = accumulator.flush_since(last_seen_tick);
        self.events = batches;
        self.data_loss = data_loss;
        copied
    }

    /// Resets per-frame state before a pooled view is handed back out,
    /// leaving its table allocations intact for the next sync to reuse.
    pub(crate) fn soft_clear(&mut self) {
        self.events.clear();
        self.data_loss = false;
    }
}

impl Default for View {
    fn default() -> Self {
        Self::new()
    }
}
