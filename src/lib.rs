//! A modular, data-oriented simulation kernel: a chunked entity/component
//! store, a synchronization engine that materializes consistent read-only
//! views for concurrent consumers, a per-frame event accumulator for
//! lagging readers, a scheduler that decides which modules run on what
//! view, and a command buffer that makes deferred writes deterministic.
//!
//! Concrete modules (physics, AI, networking, recorders) are external
//! collaborators; this crate hosts the store, the view machinery, the
//! scheduler, and the command-buffer playback engine they share.

pub mod bitmask;
pub mod cmdbuf;
pub mod component;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod kernel;
pub mod providers;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod view;

pub use bitmask::ComponentMask;
pub use component::{Blittable, Component, ComponentTier, ComponentTypeId, Managed};
pub use config::KernelConfig;
pub use entity::Entity;
pub use error::{KernelError, Result};
pub use events::Event;
pub use kernel::Kernel;
pub use store::Store;
pub use view::View;
