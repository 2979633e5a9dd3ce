//! Minimal end-to-end walkthrough: register a component and an event
//! type, register one synchronous system and one asynchronous module,
//! and drive a handful of frames through the kernel.

use simkernel::cmdbuf::CommandBuffer;
use simkernel::component::{Blittable, Component, ComponentTier, ComponentTypeId};
use simkernel::events::Event;
use simkernel::scheduler::{DataStrategy, ModuleSpec, Phase, SyncSystem};
use simkernel::view::View;
use simkernel::{ComponentMask, Kernel, KernelConfig};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(0);
    const TYPE_NAME: &'static str = "Position";
    const TIER: ComponentTier = ComponentTier::Blittable;
}
unsafe impl Blittable for Position {}

struct Spawned {
    at: (f32, f32),
}
impl Event for Spawned {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(1);
    const TYPE_NAME: &'static str = "Spawned";
}

fn main() -> simkernel::Result<()> {
    tracing_subscriber::fmt::try_init().ok();

    let mut kernel = Kernel::new(KernelConfig::default());
    kernel.store_mut().register_blittable::<Position>()?;

    // A synchronous system: spawns one entity per frame, directly against Live.
    kernel.scheduler_mut().register_system(
        SyncSystem::new("spawner", Phase::Simulation, Box::new(|store| {
            let e = store.create_entity();
            store.set_blittable(e, Position { x: 0.0, y: 0.0 })?;
            store.publish_event(Spawned { at: (0.0, 0.0) });
            Ok(())
        }))
        .at_frequency(0.0),
    );

    // An asynchronous module: logs every spawn it's caught up on, reading
    // through a pooled, component-filtered (SoD) view.
    kernel.scheduler_mut().register_module(
        ModuleSpec::asynchronous(
            "spawn-logger",
            DataStrategy::Sod,
            Arc::new(|view: &View, _cmds: &mut CommandBuffer| {
                for spawn in view.consume_events::<Spawned>() {
                    tracing::info!(x = spawn.at.0, y = spawn.at.1, "entity spawned");
                }
                Ok(())
            }),
        )
        .frequency_hz(10.0)
        .watching_events(ComponentMask::single(Spawned::TYPE_ID)),
    );

    kernel.build()?;

    for _ in 0..120 {
        kernel.run_frame();
    }

    println!("alive entities after 120 frames: {}", kernel.store().alive_count());
    Ok(())
}
