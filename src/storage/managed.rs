//! Managed component table: reference-counted, deeply immutable records,
//! synchronized by shallow `Arc` clone rather than byte copy.

use crate::component::Managed;
use crate::entity::Entity;
use crate::storage::chunk::ChunkHeader;
use std::sync::Arc;

struct ManagedChunk<T> {
    header: ChunkHeader,
    data: Vec<Option<Arc<T>>>,
}

impl<T> ManagedChunk<T> {
    fn empty() -> Self {
        Self {
            header: ChunkHeader::default(),
            data: Vec::new(),
        }
    }

    fn ensure_allocated(&mut self, capacity: usize) {
        if self.data.is_empty() {
            self.data.resize_with(capacity, || None);
        }
        self.header.allocated = true;
    }
}

/// Managed-tier storage. Presence is encoded by `Option::is_some` rather
/// than a side bitset; a write replaces the `Arc` rather than mutating
/// through it, so a replica sharing the pointer from the last sync never
/// observes a torn record.
pub struct ManagedTable<T: Managed> {
    capacity: usize,
    chunks: Vec<ManagedChunk<T>>,
    count: usize,
    last_write_tick: u64,
}

impl<T: Managed> ManagedTable<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "chunk capacity must be non-zero");
        Self {
            capacity,
            chunks: Vec::new(),
            count: 0,
            last_write_tick: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    fn locate(&self, id: u32) -> (usize, usize) {
        let id = id as usize;
        (id / self.capacity, id % self.capacity)
    }

    fn ensure_chunk(&mut self, chunk_idx: usize) -> &mut ManagedChunk<T> {
        if chunk_idx >= self.chunks.len() {
            self.chunks.resize_with(chunk_idx + 1, ManagedChunk::empty);
        }
        &mut self.chunks[chunk_idx]
    }

    pub fn set(&mut self, entity: Entity, value: T, tick: u64) {
        let (chunk_idx, slot) = self.locate(entity.id);
        let chunk = self.ensure_chunk(chunk_idx);
        chunk.ensure_allocated(self.capacity);
        if chunk.data[slot].is_none() {
            self.count += 1;
        }
        chunk.data[slot] = Some(Arc::new(value));
        chunk.header.touch();
        self.last_write_tick = tick;
    }

    pub fn remove(&mut self, entity: Entity, tick: u64) -> bool {
        let (chunk_idx, slot) = self.locate(entity.id);
        if chunk_idx >= self.chunks.len() {
            return false;
        }
        let chunk = &mut self.chunks[chunk_idx];
        if chunk.data.is_empty() || chunk.data[slot].is_none() {
            return false;
        }
        chunk.data[slot] = None;
        chunk.header.touch();
        self.count -= 1;
        self.last_write_tick = tick;
        true
    }

    /// Clone of the shared `Arc` — cheap, and the record itself is
    /// immutable so the caller can hold it across frames safely.
    pub fn get(&self, entity: Entity) -> Option<Arc<T>> {
        let (chunk_idx, slot) = self.locate(entity.id);
        self.chunks.get(chunk_idx)?.data.get(slot)?.clone()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        let (chunk_idx, slot) = self.locate(entity.id);
        self.chunks
            .get(chunk_idx)
            .and_then(|c| c.data.get(slot))
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn last_write_tick(&self) -> u64 {
        self.last_write_tick
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Arc<T>)> + '_ {
        self.chunks.iter().enumerate().flat_map(move |(c, chunk)| {
            let base = c * self.capacity;
            chunk
                .data
                .iter()
                .enumerate()
                .filter_map(move |(i, slot)| slot.clone().map(|v| ((base + i) as u32, v)))
        })
    }

    /// Shallow sync: unlike the blittable tier this clones `Arc` pointers,
    /// not record bytes, so a consumer sees the exact value the driver
    /// thread last published regardless of what happens to it afterwards.
    pub fn sync_from(&mut self, src: &Self) -> usize {
        self.capacity = src.capacity;
        if self.chunks.len() < src.chunks.len() {
            self.chunks.resize_with(src.chunks.len(), ManagedChunk::empty);
        }
        self.chunks.truncate(src.chunks.len());

        let mut copied = 0;
        let mut count = 0usize;
        for (dst, src_chunk) in self.chunks.iter_mut().zip(src.chunks.iter()) {
            if dst.header.version == src_chunk.header.version && dst.header.allocated == src_chunk.header.allocated
            {
                count += dst.data.iter().filter(|v| v.is_some()).count();
                continue;
            }
            if !src_chunk.header.allocated {
                dst.data.clear();
                dst.header = src_chunk.header;
                continue;
            }
            dst.data = src_chunk.data.clone();
            dst.header = src_chunk.header;
            count += dst.data.iter().filter(|v| v.is_some()).count();
            copied += 1;
        }
        self.count = count;
        self.last_write_tick = src.last_write_tick;
        copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentTier, ComponentTypeId};

    #[derive(Debug, Clone, PartialEq)]
    struct Label {
        text: String,
    }

    impl Component for Label {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(1);
        const TYPE_NAME: &'static str = "Label";
        const TIER: ComponentTier = ComponentTier::Managed;
    }
    impl Managed for Label {}

    fn e(id: u32) -> Entity {
        Entity::new(id, 0)
    }

    #[test]
    fn set_get_remove() {
        let mut t = ManagedTable::<Label>::with_capacity(4);
        t.set(
            e(0),
            Label {
                text: "a".into(),
            },
            1,
        );
        assert_eq!(t.get(e(0)).unwrap().text, "a");
        assert!(t.remove(e(0), 2));
        assert!(t.get(e(0)).is_none());
    }

    #[test]
    fn sync_shares_arc_pointer() {
        let mut live = ManagedTable::<Label>::with_capacity(4);
        live.set(e(0), Label { text: "a".into() }, 1);
        let mut replica = ManagedTable::<Label>::with_capacity(4);
        replica.sync_from(&live);
        let live_ptr = Arc::as_ptr(&live.get(e(0)).unwrap());
        let replica_ptr = Arc::as_ptr(&replica.get(e(0)).unwrap());
        assert_eq!(live_ptr, replica_ptr);
    }

    #[test]
    fn unchanged_chunk_is_not_recopied() {
        let mut live = ManagedTable::<Label>::with_capacity(4);
        live.set(e(0), Label { text: "a".into() }, 1);
        let mut replica = ManagedTable::<Label>::with_capacity(4);
        replica.sync_from(&live);
        assert_eq!(replica.sync_from(&live), 0);
    }
}
