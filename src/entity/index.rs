use super::Entity;

#[derive(Clone)]
struct Slot {
    alive: bool,
    generation: u32,
}

/// Sparse array keyed by entity id, carrying a liveness bit and a
/// monotonically increasing generation counter.
///
/// Ids are reused from a freelist once their entity is destroyed; the slot
/// index itself stays stable for the lifetime of the entity, and the
/// generation bump on destruction invalidates any handle still pointing at
/// the old occupant.
#[derive(Clone)]
pub struct EntityIndex {
    slots: Vec<Slot>,
    freelist: Vec<u32>,
    alive_count: usize,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            freelist: Vec::new(),
            alive_count: 0,
        }
    }

    /// Allocates an id (reusing a cleared one if available), marks it alive,
    /// and returns the handle at its current generation.
    pub fn create(&mut self) -> Entity {
        self.alive_count += 1;
        if let Some(id) = self.freelist.pop() {
            let slot = &mut self.slots[id as usize];
            slot.alive = true;
            return Entity::new(id, slot.generation);
        }
        let id = self.slots.len() as u32;
        self.slots.push(Slot {
            alive: true,
            generation: 0,
        });
        Entity::new(id, 0)
    }

    /// Verifies liveness *and* generation match.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.id as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation)
    }

    /// Marks the entity dead and bumps its generation, invalidating the
    /// handle. Returns `false` if the handle was already stale or dead.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = &mut self.slots[entity.id as usize];
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.freelist.push(entity.id);
        self.alive_count -= 1;
        true
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Total number of id slots ever allocated (alive + freed), used to size
    /// row allocations in component tables.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn current_generation(&self, id: u32) -> Option<u32> {
        self.slots.get(id as usize).map(|s| s.generation)
    }
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_alive_destroy() {
        let mut index = EntityIndex::new();
        let e = index.create();
        assert!(index.is_alive(e));
        assert!(index.destroy(e));
        assert!(!index.is_alive(e));
    }

    #[test]
    fn reused_id_bumps_generation_and_invalidates_old_handle() {
        let mut index = EntityIndex::new();
        let e1 = index.create();
        index.destroy(e1);
        let e2 = index.create();
        assert_eq!(e1.id, e2.id);
        assert_ne!(e1.generation, e2.generation);
        assert!(!index.is_alive(e1));
        assert!(index.is_alive(e2));
    }

    #[test]
    fn destroy_is_idempotent_and_reports_false_on_stale_handle() {
        let mut index = EntityIndex::new();
        let e = index.create();
        assert!(index.destroy(e));
        assert!(!index.destroy(e));
    }
}
