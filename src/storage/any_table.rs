//! Type-erased access to a component table, so the store can hold
//! heterogeneous tables behind one registry keyed by type id.

use crate::component::{Blittable, ComponentTier, Managed};
use crate::entity::Entity;
use crate::storage::{BlittableTable, ManagedTable};
use std::any::Any;

/// Operations that don't depend on the concrete record type. Typed access
/// (`get`/`set`) goes through `as_any`/`as_any_mut` downcasts from the
/// store, the same shape as reaching for a concrete table behind a
/// registered type id in any dyn-dispatched table-handle design.
pub trait AnyTable: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn tier(&self) -> ComponentTier;
    fn contains(&self, entity: Entity) -> bool;
    fn remove(&mut self, entity: Entity, tick: u64) -> bool;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn last_write_tick(&self) -> u64;
    fn chunk_count(&self) -> usize;

    /// Replaces this table's contents with a version-guarded copy from
    /// `src`, which must be the same concrete type. Returns the number of
    /// chunks actually copied. Panics on a type mismatch — callers only
    /// ever pair tables registered under the same component type id.
    fn sync_from_any(&mut self, src: &dyn AnyTable) -> usize;

    /// Builds a fresh, empty table of the same concrete type and
    /// configuration as `self`, used when a view needs to materialize a
    /// replica for a type it hasn't seen before.
    fn new_replica(&self) -> Box<dyn AnyTable>;

    /// Deep copy, chunk headers included, so the clone carries the same
    /// version numbers and a later `sync_from_any` against the live table
    /// only re-copies chunks that changed since.
    fn clone_box(&self) -> Box<dyn AnyTable>;
}

impl<T: Blittable + Default> AnyTable for BlittableTable<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn tier(&self) -> ComponentTier {
        ComponentTier::Blittable
    }
    fn contains(&self, entity: Entity) -> bool {
        BlittableTable::contains(self, entity)
    }
    fn remove(&mut self, entity: Entity, tick: u64) -> bool {
        BlittableTable::remove(self, entity, tick)
    }
    fn len(&self) -> usize {
        BlittableTable::len(self)
    }
    fn last_write_tick(&self) -> u64 {
        BlittableTable::last_write_tick(self)
    }
    fn chunk_count(&self) -> usize {
        BlittableTable::chunk_count(self)
    }
    fn sync_from_any(&mut self, src: &dyn AnyTable) -> usize {
        let src = src
            .as_any()
            .downcast_ref::<BlittableTable<T>>()
            .expect("sync_from_any called with mismatched concrete table type");
        self.sync_from(src)
    }
    fn new_replica(&self) -> Box<dyn AnyTable> {
        Box::new(BlittableTable::<T>::with_capacity(self.capacity()))
    }
    fn clone_box(&self) -> Box<dyn AnyTable> {
        let mut copy = BlittableTable::<T>::with_capacity(self.capacity());
        copy.sync_from(self);
        Box::new(copy)
    }
}

impl<T: Managed> AnyTable for ManagedTable<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn tier(&self) -> ComponentTier {
        ComponentTier::Managed
    }
    fn contains(&self, entity: Entity) -> bool {
        ManagedTable::contains(self, entity)
    }
    fn remove(&mut self, entity: Entity, tick: u64) -> bool {
        ManagedTable::remove(self, entity, tick)
    }
    fn len(&self) -> usize {
        ManagedTable::len(self)
    }
    fn last_write_tick(&self) -> u64 {
        ManagedTable::last_write_tick(self)
    }
    fn chunk_count(&self) -> usize {
        ManagedTable::chunk_count(self)
    }
    fn sync_from_any(&mut self, src: &dyn AnyTable) -> usize {
        let src = src
            .as_any()
            .downcast_ref::<ManagedTable<T>>()
            .expect("sync_from_any called with mismatched concrete table type");
        self.sync_from(src)
    }
    fn new_replica(&self) -> Box<dyn AnyTable> {
        Box::new(ManagedTable::<T>::with_capacity(self.capacity()))
    }
    fn clone_box(&self) -> Box<dyn AnyTable> {
        let mut copy = ManagedTable::<T>::with_capacity(self.capacity());
        copy.sync_from(self);
        Box::new(copy)
    }
}
