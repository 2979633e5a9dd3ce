//! Deferred writes recorded by a module reading from a view, played back
//! onto Live by the driver thread at the next sync point.
//!
//! A module never touches Live directly: it records intent against a
//! `CommandBuffer` — create, destroy, set, remove, publish — and the driver
//! replays that buffer later, on the thread that owns Live, after
//! re-validating every entity handle against whatever the world looks like
//! by the time playback actually runs.

use crate::component::{Blittable, Component, Managed};
use crate::entity::Entity;
use crate::events::Event;
use crate::store::Store;
use std::collections::HashMap;

/// A placeholder handle for an entity created earlier in the same buffer,
/// remapped to a real `Entity` during playback. Negative and unique within
/// the buffer that minted it.
pub type TempId = i64;

enum EntityRef {
    Real(Entity),
    Temp(TempId),
}

type Apply = Box<dyn FnOnce(&mut Store, Entity) -> crate::error::Result<()> + Send>;

enum Command {
    CreateEntity(TempId),
    DestroyEntity(EntityRef),
    SetComponent { entity: EntityRef, apply: Apply },
    RemoveComponent { entity: EntityRef, apply: Apply },
    PublishEvent(Box<dyn FnOnce(&mut Store) + Send>),
}

/// Counts of commands actually applied versus dropped for failing the
/// optimistic-concurrency recheck (stale or already-dead entity). Playback
/// never aborts on a validation failure — it drops the one command and
/// keeps going.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStats {
    pub applied: usize,
    pub validation_failed: usize,
}

/// A module's deferred write log for one run. `Send` so it can travel back
/// from a worker thread to the driver for playback.
#[derive(Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    next_temp_id: TempId,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            next_temp_id: -1,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Records a create; returns a handle usable within this buffer (as an
    /// argument to `set_component_on_temp` etc.) before the entity exists.
    pub fn create_entity(&mut self) -> TempId {
        let id = self.next_temp_id;
        self.next_temp_id -= 1;
        self.commands.push(Command::CreateEntity(id));
        id
    }

    pub fn destroy_entity(&mut self, entity: Entity) {
        self.commands.push(Command::DestroyEntity(EntityRef::Real(entity)));
    }

    pub fn destroy_temp(&mut self, temp_id: TempId) {
        self.commands.push(Command::DestroyEntity(EntityRef::Temp(temp_id)));
    }

    pub fn set_blittable<T: Blittable + Default>(&mut self, entity: Entity, value: T) {
        self.commands.push(Command::SetComponent {
            entity: EntityRef::Real(entity),
            apply: Box::new(move |store, e| store.set_blittable::<T>(e, value)),
        });
    }

    pub fn set_blittable_on_temp<T: Blittable + Default>(&mut self, temp_id: TempId, value: T) {
        self.commands.push(Command::SetComponent {
            entity: EntityRef::Temp(temp_id),
            apply: Box::new(move |store, e| store.set_blittable::<T>(e, value)),
        });
    }

    pub fn set_managed<T: Managed>(&mut self, entity: Entity, value: T) {
        self.commands.push(Command::SetComponent {
            entity: EntityRef::Real(entity),
            apply: Box::new(move |store, e| store.set_managed::<T>(e, value)),
        });
    }

    pub fn set_managed_on_temp<T: Managed>(&mut self, temp_id: TempId, value: T) {
        self.commands.push(Command::SetComponent {
            entity: EntityRef::Temp(temp_id),
            apply: Box::new(move |store, e| store.set_managed::<T>(e, value)),
        });
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) {
        self.commands.push(Command::RemoveComponent {
            entity: EntityRef::Real(entity),
            apply: Box::new(|store, e| store.remove_component::<T>(e).map(|_| ())),
        });
    }

    pub fn publish_event<T: Event>(&mut self, event: T) {
        self.commands
            .push(Command::PublishEvent(Box::new(move |store| store.publish_event(event))));
    }
}

/// Replays every recorded command onto `store`, remapping temp ids to the
/// entities they actually turned into and re-checking liveness/generation
/// before each write. Returns how many commands landed versus were dropped.
pub fn playback(buffer: CommandBuffer, store: &mut Store) -> PlaybackStats {
    let mut temp_map: HashMap<TempId, Entity> = HashMap::new();
    let mut stats = PlaybackStats::default();

    let resolve = |temp_map: &HashMap<TempId, Entity>, r: &EntityRef| -> Option<Entity> {
        match r {
            EntityRef::Real(e) => Some(*e),
            EntityRef::Temp(id) => temp_map.get(id).copied(),
        }
    };

    for command in buffer.commands {
        match command {
            Command::CreateEntity(temp_id) => {
                let entity = store.create_entity();
                temp_map.insert(temp_id, entity);
                stats.applied += 1;
            }
            Command::DestroyEntity(entity_ref) => match resolve(&temp_map, &entity_ref) {
                Some(entity) if store.is_alive(entity) => match store.destroy_entity(entity) {
                    Ok(()) => stats.applied += 1,
                    Err(_) => stats.validation_failed += 1,
                },
                _ => stats.validation_failed += 1,
            },
            Command::SetComponent { entity, apply } | Command::RemoveComponent { entity, apply } => {
                match resolve(&temp_map, &entity) {
                    Some(entity) if store.is_alive(entity) => match apply(store, entity) {
                        Ok(()) => stats.applied += 1,
                        Err(_) => stats.validation_failed += 1,
                    },
                    _ => stats.validation_failed += 1,
                }
            }
            Command::PublishEvent(apply) => {
                apply(store);
                stats.applied += 1;
            }
        }
    }

    stats
}
