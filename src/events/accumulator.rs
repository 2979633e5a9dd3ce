//! Multi-frame retention of harvested event batches, so a consumer that
//! reads less often than the driver thread ticks can still catch up.

use super::bus::FrameEventBatch;
use crate::bitmask::ComponentMask;
use std::collections::VecDeque;
use std::sync::Arc;

/// Floor on retained frames regardless of configuration — below this a
/// consumer ticking one frame behind the driver would already see gaps.
pub const MIN_HISTORY_FRAMES: usize = 4;

/// Ceiling on retained frames — past this, a consumer that fell behind is
/// considered lost rather than given unbounded memory to catch up with.
pub const MAX_HISTORY_FRAMES: usize = 256;

/// Retired batches keyed by the tick they were harvested at. Batches are
/// held behind `Arc` so flushing to many simultaneous consumers (a GDB
/// replica, a convoy group, a handful of SoD views) is a pointer clone, not
/// a deep copy of the frame's events.
pub struct EventAccumulator {
    history: VecDeque<(u64, Arc<FrameEventBatch>)>,
    min_frames: usize,
    max_frames: usize,
}

impl EventAccumulator {
    /// `min_frames` is the configured lower bound a consumer is expected to
    /// lag by (`KernelConfig::min_history_frames`); `max_frames` is the hard
    /// ceiling past which a lagging consumer is considered lost rather than
    /// given unbounded memory to catch up with
    /// (`KernelConfig::max_history_frames`). Both are clamped against this
    /// module's absolute floor/ceiling.
    pub fn new(min_frames: usize, max_frames: usize) -> Self {
        let min_frames = min_frames.clamp(MIN_HISTORY_FRAMES, MAX_HISTORY_FRAMES);
        let max_frames = max_frames.clamp(min_frames, MAX_HISTORY_FRAMES);
        Self {
            history: VecDeque::new(),
            min_frames,
            max_frames,
        }
    }

    /// Convenience constructor for call sites that only care about the
    /// module-wide default floor, not a host-configured one.
    pub fn with_max(max_frames: usize) -> Self {
        Self::new(MIN_HISTORY_FRAMES, max_frames)
    }

    pub fn push(&mut self, tick: u64, batch: FrameEventBatch) {
        self.history.push_back((tick, Arc::new(batch)));
        while self.history.len() > self.max_frames {
            self.history.pop_front();
        }
    }

    /// Every retained batch strictly newer than `since_tick`, oldest first,
    /// plus whether batches were evicted before a consumer at `since_tick`
    /// could have read them (`data_loss`).
    pub fn flush_since(&self, since_tick: u64) -> (Vec<Arc<FrameEventBatch>>, bool) {
        let data_loss = match self.history.front() {
            Some((oldest, _)) => since_tick != 0 && *oldest > since_tick + 1,
            None => false,
        };
        let batches = self
            .history
            .iter()
            .filter(|(tick, _)| *tick > since_tick)
            .map(|(_, batch)| batch.clone())
            .collect();
        (batches, data_loss)
    }

    /// Whether any batch newer than `since_tick` carries an event of a type
    /// named in `mask` — the scheduler's due-by-watched-event check.
    pub fn has_events_since(&self, mask: &ComponentMask, since_tick: u64) -> bool {
        self.history.iter().any(|(tick, batch)| {
            *tick > since_tick && mask.iter().any(|type_id| batch.contains_type(type_id))
        })
    }

    pub fn retained_frames(&self) -> usize {
        self.history.len()
    }

    pub fn oldest_retained_tick(&self) -> Option<u64> {
        self.history.front().map(|(tick, _)| *tick)
    }

    /// The configured lower bound this instance was built with.
    pub fn min_frames(&self) -> usize {
        self.min_frames
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }
}
