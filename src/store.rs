//! The live world: the single authoritative copy of every entity and
//! component, mutated only from the driver thread that owns it.

use crate::bitmask::ComponentMask;
use crate::component::{Blittable, Component, ComponentTypeId, Managed};
use crate::entity::{Entity, EntityIndex};
use crate::error::{KernelError, Result};
use crate::events::{Event, EventBus};
use crate::storage::{AnyTable, BlittableTable, ManagedTable};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// The authoritative entity/component store. Read access (`get_*`,
/// `contains`, `query`) is safe from any thread; structural writes
/// (`create_entity`, `set_*`, `remove_*`, `end_frame`) take `&mut self` so
/// the borrow checker enforces the single-writer discipline rather than a
/// runtime check.
pub struct Store {
    entities: EntityIndex,
    tables: DashMap<ComponentTypeId, Box<dyn AnyTable>>,
    registered: ComponentMask,
    events: EventBus,
    tick: AtomicU64,
    chunk_capacity: usize,
    chunk_bytes: usize,
    seconds_per_tick: f64,
}

impl Store {
    pub fn new(chunk_capacity: usize) -> Self {
        Self {
            entities: EntityIndex::new(),
            tables: DashMap::new(),
            registered: ComponentMask::empty(),
            events: EventBus::new(),
            tick: AtomicU64::new(0),
            chunk_capacity,
            chunk_bytes: crate::storage::chunk::DEFAULT_CHUNK_BYTES,
            seconds_per_tick: 1.0 / 60.0,
        }
    }

    /// Sets the byte budget blittable tables size their chunks against,
    /// overriding the module default. Only affects tables registered after
    /// the call.
    pub fn set_chunk_bytes(&mut self, chunk_bytes: usize) {
        self.chunk_bytes = chunk_bytes;
    }

    /// Sets the wall-clock duration of one tick, used to derive [`Store::time`].
    pub fn set_frame_rate_hz(&mut self, hz: f64) {
        self.seconds_per_tick = 1.0 / hz;
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// The configured frame rate, derived back out of `seconds_per_tick` —
    /// used by the scheduler's due predicate to convert a module's
    /// `frequency_hz` into a tick-count threshold.
    pub fn frame_rate_hz(&self) -> f64 {
        1.0 / self.seconds_per_tick
    }

    /// Simulation time elapsed at the current tick, in seconds.
    pub fn time(&self) -> f64 {
        self.tick() as f64 * self.seconds_per_tick
    }

    pub fn registered_mask(&self) -> ComponentMask {
        self.registered
    }

    pub fn register_blittable<T: Blittable + Default>(&mut self) -> Result<()> {
        if self.registered.contains(T::TYPE_ID) {
            return Err(KernelError::DuplicateType(T::TYPE_ID));
        }
        self.tables.insert(
            T::TYPE_ID,
            Box::new(BlittableTable::<T>::with_chunk_bytes(self.chunk_bytes)),
        );
        self.registered.set(T::TYPE_ID);
        Ok(())
    }

    pub fn register_managed<T: Managed>(&mut self) -> Result<()> {
        if self.registered.contains(T::TYPE_ID) {
            return Err(KernelError::DuplicateType(T::TYPE_ID));
        }
        T::assert_immutable()?;
        self.tables.insert(
            T::TYPE_ID,
            Box::new(ManagedTable::<T>::with_capacity(self.chunk_capacity)),
        );
        self.registered.set(T::TYPE_ID);
        Ok(())
    }

    pub fn create_entity(&mut self) -> Entity {
        self.entities.create()
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn alive_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Destroys the entity and strips it out of every registered table.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<()> {
        if !self.entities.destroy(entity) {
            return Err(KernelError::DeadEntity(entity));
        }
        let tick = self.tick();
        for mut table in self.tables.iter_mut() {
            table.value_mut().remove(entity, tick);
        }
        Ok(())
    }

    pub fn set_blittable<T: Blittable + Default>(&mut self, entity: Entity, value: T) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Err(KernelError::DeadEntity(entity));
        }
        let tick = self.tick();
        let mut table = self
            .tables
            .get_mut(&T::TYPE_ID)
            .ok_or(KernelError::UnknownType(T::TYPE_ID))?;
        let table = table
            .value_mut()
            .as_any_mut()
            .downcast_mut::<BlittableTable<T>>()
            .ok_or(KernelError::TierMismatch(T::TYPE_ID))?;
        table.set(entity, value, tick);
        Ok(())
    }

    pub fn set_managed<T: Managed>(&mut self, entity: Entity, value: T) -> Result<()> {
        if !self.entities.is_alive(entity) {
            return Err(KernelError::DeadEntity(entity));
        }
        let tick = self.tick();
        let mut table = self
            .tables
            .get_mut(&T::TYPE_ID)
            .ok_or(KernelError::UnknownType(T::TYPE_ID))?;
        let table = table
            .value_mut()
            .as_any_mut()
            .downcast_mut::<ManagedTable<T>>()
            .ok_or(KernelError::TierMismatch(T::TYPE_ID))?;
        table.set(entity, value, tick);
        Ok(())
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<bool> {
        let tick = self.tick();
        let mut table = self
            .tables
            .get_mut(&T::TYPE_ID)
            .ok_or(KernelError::UnknownType(T::TYPE_ID))?;
        Ok(table.value_mut().remove(entity, tick))
    }

    pub fn get_blittable<T: Blittable + Default>(&self, entity: Entity) -> Result<Option<T>> {
        let table = self
            .tables
            .get(&T::TYPE_ID)
            .ok_or(KernelError::UnknownType(T::TYPE_ID))?;
        let table = table
            .value()
            .as_any()
            .downcast_ref::<BlittableTable<T>>()
            .ok_or(KernelError::TierMismatch(T::TYPE_ID))?;
        Ok(table.get(entity))
    }

    /// In-place mutable access to an existing blittable component, scoped
    /// to a closure rather than a returned reference
    /// since the backing table lives behind a concurrent map guard. Only
    /// meaningful on the driver thread: any view holding this type sees
    /// the chunk's old bytes until its next sync regardless of what's
    /// written here. Returns `Ok(None)` without calling `f` if the entity
    /// has no component of this type yet — use [`Store::set_blittable`] to
    /// upsert one first.
    pub fn with_blittable_mut<T: Blittable + Default, R>(
        &mut self,
        entity: Entity,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<Option<R>> {
        if !self.entities.is_alive(entity) {
            return Err(KernelError::DeadEntity(entity));
        }
        let tick = self.tick();
        let mut table = self
            .tables
            .get_mut(&T::TYPE_ID)
            .ok_or(KernelError::UnknownType(T::TYPE_ID))?;
        let table = table
            .value_mut()
            .as_any_mut()
            .downcast_mut::<BlittableTable<T>>()
            .ok_or(KernelError::TierMismatch(T::TYPE_ID))?;
        Ok(table.get_mut(entity, tick).map(f))
    }

    pub fn get_managed<T: Managed>(&self, entity: Entity) -> Result<Option<std::sync::Arc<T>>> {
        let table = self
            .tables
            .get(&T::TYPE_ID)
            .ok_or(KernelError::UnknownType(T::TYPE_ID))?;
        let table = table
            .value()
            .as_any()
            .downcast_ref::<ManagedTable<T>>()
            .ok_or(KernelError::TierMismatch(T::TYPE_ID))?;
        Ok(table.get(entity))
    }

    pub fn contains<T: Component>(&self, entity: Entity) -> bool {
        self.tables
            .get(&T::TYPE_ID)
            .map(|t| t.contains(entity))
            .unwrap_or(false)
    }

    /// Entities satisfying every type in `mask`, ascending by id. Drives
    /// the search off whichever required table is smallest.
    pub fn query(&self, mask: &ComponentMask) -> Vec<Entity> {
        let required: Vec<ComponentTypeId> = mask.iter().collect();
        if required.is_empty() {
            return Vec::new();
        }
        let driver = required
            .iter()
            .filter_map(|id| self.tables.get(id).map(|t| (*id, t.len())))
            .min_by_key(|(_, len)| *len);
        let Some((driver_id, _)) = driver else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let slot_count = self.entities.slot_count() as u32;
        for id in 0..slot_count {
            let entity = Entity::new(id, self.entities.current_generation(id).unwrap_or(0));
            if !self.entities.is_alive(entity) {
                continue;
            }
            if !self
                .tables
                .get(&driver_id)
                .map(|t| t.contains(entity))
                .unwrap_or(false)
            {
                continue;
            }
            if required
                .iter()
                .all(|id| self.tables.get(id).map(|t| t.contains(entity)).unwrap_or(false))
            {
                out.push(entity);
            }
        }
        out
    }

    pub fn publish_event<T: Event>(&mut self, event: T) {
        self.events.publish(event);
    }

    /// A standalone copy of the entity liveness table, used by a provider
    /// materializing a view so the view's notion of "alive" doesn't chase
    /// the driver thread mid-read.
    pub fn clone_entity_index(&self) -> EntityIndex {
        self.entities.clone()
    }

    /// The tick at which a given component type was last written, used by
    /// the scheduler's due predicate to detect watched-component writes.
    /// `None` if the type isn't registered.
    pub fn last_write_tick_for(&self, type_id: ComponentTypeId) -> Option<u64> {
        self.tables.get(&type_id).map(|t| t.last_write_tick())
    }

    /// Harvests the current frame's events and advances the tick counter.
    /// Returns the batch tagged with the tick it finished on (1-based: the
    /// first frame ever ended is tick 1), so a fresh consumer cursor of 0
    /// means "seen nothing" and correctly catches the first frame's events.
    pub fn end_frame(&mut self) -> (u64, crate::events::FrameEventBatch) {
        let batch = self.events.harvest();
        let finished_tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        (finished_tick, batch)
    }

    /// Copies every table named in `mask` into `target`, creating replica
    /// tables on first sight of a type. Returns the total number of
    /// chunks actually copied, across all synced tables.
    pub fn sync_into(&self, target: &mut crate::storage::TableSet, mask: &ComponentMask) -> usize {
        let mut total = 0;
        for entry in self.tables.iter() {
            let type_id = *entry.key();
            if !mask.contains(type_id) {
                continue;
            }
            total += target.sync_one(type_id, entry.value().as_ref());
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentTier, ComponentTypeId};

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(10);
        const TYPE_NAME: &'static str = "Position";
        const TIER: ComponentTier = ComponentTier::Blittable;
    }
    unsafe impl Blittable for Position {}

    #[derive(Debug, Clone, PartialEq)]
    struct Name(String);
    impl Component for Name {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(11);
        const TYPE_NAME: &'static str = "Name";
        const TIER: ComponentTier = ComponentTier::Managed;
    }
    impl Managed for Name {}

    #[test]
    fn create_set_get_destroy_round_trip() {
        let mut store = Store::new(16);
        store.register_blittable::<Position>().unwrap();
        store.register_managed::<Name>().unwrap();

        let e = store.create_entity();
        store.set_blittable(e, Position { x: 1.0, y: 2.0 }).unwrap();
        store.set_managed(e, Name("hero".into())).unwrap();

        assert_eq!(store.get_blittable::<Position>(e).unwrap(), Some(Position { x: 1.0, y: 2.0 }));
        assert_eq!(store.get_managed::<Name>(e).unwrap().unwrap().0, "hero");

        store.destroy_entity(e).unwrap();
        assert!(!store.is_alive(e));
        assert_eq!(store.get_blittable::<Position>(e).unwrap(), None);
    }

    #[test]
    fn query_intersects_required_types() {
        let mut store = Store::new(16);
        store.register_blittable::<Position>().unwrap();
        store.register_managed::<Name>().unwrap();

        let a = store.create_entity();
        store.set_blittable(a, Position::default()).unwrap();
        store.set_managed(a, Name("a".into())).unwrap();

        let b = store.create_entity();
        store.set_blittable(b, Position::default()).unwrap();

        let mut mask = ComponentMask::empty();
        mask.set(Position::TYPE_ID);
        mask.set(Name::TYPE_ID);
        let results = store.query(&mask);
        assert_eq!(results, vec![a]);
    }

    #[test]
    fn with_blittable_mut_writes_in_place_and_bumps_version() {
        let mut store = Store::new(16);
        store.register_blittable::<Position>().unwrap();
        let e = store.create_entity();
        store.set_blittable(e, Position { x: 1.0, y: 1.0 }).unwrap();

        let before = store.last_write_tick_for(Position::TYPE_ID);
        let result = store
            .with_blittable_mut::<Position, _>(e, |pos| {
                pos.x += 1.0;
                pos.x
            })
            .unwrap();
        assert_eq!(result, Some(2.0));
        assert_eq!(store.get_blittable::<Position>(e).unwrap().unwrap().x, 2.0);
        assert_eq!(store.last_write_tick_for(Position::TYPE_ID), before);

        let other = store.create_entity();
        let missing = store.with_blittable_mut::<Position, _>(other, |pos| pos.x).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut store = Store::new(16);
        store.register_blittable::<Position>().unwrap();
        assert!(matches!(
            store.register_blittable::<Position>(),
            Err(KernelError::DuplicateType(_))
        ));
    }
}
