//! Current-frame event buffers, keyed by event type.

use super::Event;
use crate::component::ComponentTypeId;
use std::any::Any;
use std::collections::HashMap;

trait ErasedEventVec: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn take(&mut self) -> Box<dyn ErasedEventVec>;
    fn len(&self) -> usize;
}

impl<T: Event> ErasedEventVec for Vec<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn take(&mut self) -> Box<dyn ErasedEventVec> {
        Box::new(std::mem::take(self))
    }
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// A frozen batch of events collected over one frame, still partitioned by
/// type so a consumer can ask for just the types it cares about.
#[derive(Default)]
pub struct FrameEventBatch {
    by_type: HashMap<ComponentTypeId, Box<dyn ErasedEventVec>>,
}

impl FrameEventBatch {
    pub fn of<T: Event>(&self) -> &[T] {
        self.by_type
            .get(&T::TYPE_ID)
            .and_then(|v| v.as_any().downcast_ref::<Vec<T>>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.values().all(|v| v.len() == 0)
    }

    pub fn total_len(&self) -> usize {
        self.by_type.values().map(|v| v.len()).sum()
    }

    /// Whether this batch carries at least one event of the given type —
    /// used by the scheduler's due predicate to test a watched-events mask
    /// without knowing any concrete event type.
    pub fn contains_type(&self, type_id: ComponentTypeId) -> bool {
        self.by_type.get(&type_id).map(|v| v.len() > 0).unwrap_or(false)
    }
}

/// Accumulates events raised during the current frame, keeping each type's
/// events in its own typed `Vec` until the frame is harvested.
#[derive(Default)]
pub struct EventBus {
    by_type: HashMap<ComponentTypeId, Box<dyn ErasedEventVec>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish<T: Event>(&mut self, event: T) {
        let entry = self
            .by_type
            .entry(T::TYPE_ID)
            .or_insert_with(|| Box::new(Vec::<T>::new()));
        entry
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .expect("event type id reused by a different Rust type")
            .push(event);
    }

    /// Moves the current frame's events out into an immutable batch,
    /// leaving the bus empty for the next frame.
    pub fn harvest(&mut self) -> FrameEventBatch {
        let mut by_type = HashMap::with_capacity(self.by_type.len());
        for (id, slot) in self.by_type.iter_mut() {
            by_type.insert(*id, slot.take());
        }
        FrameEventBatch { by_type }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Damage {
        amount: u32,
    }
    impl Event for Damage {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(50);
        const TYPE_NAME: &'static str = "Damage";
    }

    #[test]
    fn publish_and_harvest() {
        let mut bus = EventBus::new();
        bus.publish(Damage { amount: 3 });
        bus.publish(Damage { amount: 7 });
        let batch = bus.harvest();
        let events = batch.of::<Damage>();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].amount, 3);
        assert_eq!(events[1].amount, 7);

        let next = bus.harvest();
        assert!(next.is_empty());
    }
}
