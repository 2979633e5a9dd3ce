//! Blittable component table: fixed-size records in contiguous chunks,
//! synchronized by raw chunk copy.

use crate::component::Blittable;
use crate::entity::Entity;
use crate::storage::chunk::ChunkHeader;
use std::marker::PhantomData;

struct BlittableChunk<T> {
    header: ChunkHeader,
    data: Vec<T>,
    present: Vec<bool>,
}

impl<T: Copy + Default> BlittableChunk<T> {
    fn empty() -> Self {
        Self {
            header: ChunkHeader::default(),
            data: Vec::new(),
            present: Vec::new(),
        }
    }

    fn ensure_allocated(&mut self, capacity: usize) {
        if self.data.is_empty() {
            self.data = vec![T::default(); capacity];
            self.present = vec![false; capacity];
        }
        self.header.allocated = true;
    }
}

/// A blittable component's storage: `id / capacity` selects the chunk,
/// `id % capacity` selects the slot within it, `c * CHUNK_BYTES + i * S`
/// addressing with `i` derived straight from the
/// entity id rather than an independent per-table row allocator.
pub struct BlittableTable<T: Blittable> {
    capacity: usize,
    chunks: Vec<BlittableChunk<T>>,
    count: usize,
    last_write_tick: u64,
    _marker: PhantomData<T>,
}

impl<T: Blittable + Default> BlittableTable<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "chunk capacity must be non-zero");
        Self {
            capacity,
            chunks: Vec::new(),
            count: 0,
            last_write_tick: 0,
            _marker: PhantomData,
        }
    }

    pub fn with_chunk_bytes(chunk_bytes: usize) -> Self {
        let record_size = std::mem::size_of::<T>().max(1);
        Self::with_capacity((chunk_bytes / record_size).max(1))
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

    fn ensure_chunk(&mut self, chunk_idx: usize) -> &mut BlittableChunk<T> {
        if chunk_idx >= self.chunks.len() {
            self.chunks
                .resize_with(chunk_idx + 1, BlittableChunk::empty);
        }
        &mut self.chunks[chunk_idx]
    }

    /// Upsert: always succeeds on a valid id. Bumps the chunk's version and
    /// the table's last-write tick.
    pub fn set(&mut self, entity: Entity, value: T, tick: u64) {
        let (chunk_idx, slot) = self.locate(entity.id);
        let chunk = self.ensure_chunk(chunk_idx);
        chunk.ensure_allocated(self.capacity);
        if !chunk.present[slot] {
            self.count += 1;
        }
        chunk.data[slot] = value;
        chunk.present[slot] = true;
        chunk.header.touch();
        self.last_write_tick = tick;
    }

    pub fn remove(&mut self, entity: Entity, tick: u64) -> bool {
        let (chunk_idx, slot) = self.locate(entity.id);
        if chunk_idx >= self.chunks.len() {
            return false;
        }
        let chunk = &mut self.chunks[chunk_idx];
        if chunk.data.is_empty() || !chunk.present[slot] {
            return false;
        }
        chunk.present[slot] = false;
        chunk.data[slot] = T::default();
        chunk.header.touch();
        self.count -= 1;
        self.last_write_tick = tick;
        true
    }

    pub fn get(&self, entity: Entity) -> Option<T> {
        let (chunk_idx, slot) = self.locate(entity.id);
        let chunk = self.chunks.get(chunk_idx)?;
        if chunk.present.get(slot).copied().unwrap_or(false) {
            Some(chunk.data[slot])
        } else {
            None
        }
    }

    /// In-place mutable access for the driver thread:
    /// bumps the chunk's version up front, on the assumption that a caller
    /// asking for `&mut T` intends to write through it. `None` if the
    /// entity carries no component of this type yet — callers that want
    /// upsert semantics should go through [`BlittableTable::set`] instead.
    pub fn get_mut(&mut self, entity: Entity, tick: u64) -> Option<&mut T> {
        let (chunk_idx, slot) = self.locate(entity.id);
        let chunk = self.chunks.get_mut(chunk_idx)?;
        if !chunk.present.get(slot).copied().unwrap_or(false) {
            return None;
        }
        chunk.header.touch();
        self.last_write_tick = tick;
        Some(&mut self.chunks[chunk_idx].data[slot])
    }

    pub fn contains(&self, entity: Entity) -> bool {
        let (chunk_idx, slot) = self.locate(entity.id);
        self.chunks
            .get(chunk_idx)
            .and_then(|c| c.present.get(slot).copied())
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

    /// Ascending-id iteration over currently present entries.
    pub fn iter(&self) -> impl Iterator<Item = (u32, T)> + '_ {
        self.chunks.iter().enumerate().flat_map(move |(c, chunk)| {
            let base = c * self.capacity;
            chunk
                .present
                .iter()
                .enumerate()
                .filter(|(_, present)| **present)
                .map(move |(i, _)| ((base + i) as u32, chunk.data[i]))
        })
    }

    /// Version-guarded chunk copy: skip chunks whose version already
    /// matches, clear chunks that became unallocated in `src`, otherwise
    /// raw-copy the chunk wholesale. Returns the number of chunks actually
    /// copied (used by tests to assert dirty-chunk tracking).
    pub fn sync_from(&mut self, src: &Self) -> usize {
        self.capacity = src.capacity;
        if self.chunks.len() < src.chunks.len() {
            self.chunks
                .resize_with(src.chunks.len(), BlittableChunk::empty);
        }
        self.chunks.truncate(src.chunks.len());

        let mut copied = 0;
        let mut count = 0usize;
        for (dst, src_chunk) in self.chunks.iter_mut().zip(src.chunks.iter()) {
            if dst.header.version == src_chunk.header.version && dst.header.allocated == src_chunk.header.allocated
            {
                count += dst.present.iter().filter(|p| **p).count();
                continue;
            }
            if !src_chunk.header.allocated {
                dst.data.clear();
                dst.present.clear();
                dst.header = src_chunk.header;
                continue;
            }
            dst.data = src_chunk.data.clone();
            dst.present = src_chunk.present.clone();
            dst.header = src_chunk.header;
            count += dst.present.iter().filter(|p| **p).count();
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

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position {
        x: f32,
    }

    impl Component for Position {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(0);
        const TYPE_NAME: &'static str = "Position";
        const TIER: ComponentTier = ComponentTier::Blittable;
    }
    unsafe impl Blittable for Position {}

    fn e(id: u32) -> Entity {
        Entity::new(id, 0)
    }

    #[test]
    fn set_get_remove() {
        let mut t = BlittableTable::<Position>::with_capacity(4);
        t.set(e(0), Position { x: 1.0 }, 1);
        assert_eq!(t.get(e(0)), Some(Position { x: 1.0 }));
        assert!(t.remove(e(0), 2));
        assert_eq!(t.get(e(0)), None);
        assert!(!t.remove(e(0), 3));
    }

    #[test]
    fn dirty_chunk_tracking_copies_only_changed_chunk() {
        // capacity 4, 5 entities, then mutate only one.
        let mut live = BlittableTable::<Position>::with_capacity(4);
        for i in 0..5u32 {
            live.set(e(i), Position { x: i as f32 }, 1);
        }
        let mut replica = BlittableTable::<Position>::with_capacity(4);
        let copied = replica.sync_from(&live);
        assert_eq!(copied, 2); // two chunks: [0..4), [4..5)
        for i in 0..5u32 {
            assert_eq!(replica.get(e(i)), Some(Position { x: i as f32 }));
        }

        live.set(e(2), Position { x: 99.0 }, 2);
        let copied = replica.sync_from(&live);
        assert_eq!(copied, 1); // only the chunk containing entity 2 changed

        let expected = [0.0, 1.0, 99.0, 3.0, 4.0];
        for i in 0..5u32 {
            assert_eq!(replica.get(e(i)).unwrap().x, expected[i as usize]);
        }
    }

    #[test]
    fn repeated_sync_with_no_writes_copies_nothing() {
        let mut live = BlittableTable::<Position>::with_capacity(4);
        live.set(e(0), Position { x: 1.0 }, 1);
        let mut replica = BlittableTable::<Position>::with_capacity(4);
        replica.sync_from(&live);
        assert_eq!(replica.sync_from(&live), 0);
    }
}
