//! Event publication and cross-frame retention for lagging consumers.

pub mod accumulator;
pub mod bus;

pub use accumulator::{EventAccumulator, MAX_HISTORY_FRAMES, MIN_HISTORY_FRAMES};
pub use bus::{EventBus, FrameEventBatch};

use crate::component::ComponentTypeId;

/// A published event type, sharing the component/event type id space.
pub trait Event: Send + Sync + 'static {
    const TYPE_ID: ComponentTypeId;
    const TYPE_NAME: &'static str;
}
