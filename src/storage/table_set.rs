//! A plain, single-owner registry of tables keyed by component type id.
//!
//! The live store keeps its tables in a concurrent map (see
//! [`crate::store::Store`]); a replica (a view's private copy) is only
//! ever touched by the one consumer that owns it, so a `HashMap` behind
//! `&mut self` is enough.

use crate::component::ComponentTypeId;
use crate::storage::AnyTable;
use std::collections::HashMap;

#[derive(Default)]
pub struct TableSet {
    tables: HashMap<ComponentTypeId, Box<dyn AnyTable>>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_id: ComponentTypeId) -> Option<&dyn AnyTable> {
        self.tables.get(&type_id).map(|b| b.as_ref())
    }

    pub fn contains_type(&self, type_id: ComponentTypeId) -> bool {
        self.tables.contains_key(&type_id)
    }

    /// Copies one source table in, creating a fresh replica table the
    /// first time this type is seen. Returns the number of chunks copied.
    pub fn sync_one(&mut self, type_id: ComponentTypeId, src: &dyn AnyTable) -> usize {
        let dst = self
            .tables
            .entry(type_id)
            .or_insert_with(|| src.new_replica());
        dst.sync_from_any(src)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Clone for TableSet {
    fn clone(&self) -> Self {
        Self {
            tables: self
                .tables
                .iter()
                .map(|(id, table)| (*id, table.clone_box()))
                .collect(),
        }
    }
}
