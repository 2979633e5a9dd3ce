//! Black-box, whole-kernel tests exercising the public API the way a host
//! process would: register types and modules, build, and drive frames.

use simkernel::bitmask::ComponentMask;
use simkernel::cmdbuf::CommandBuffer;
use simkernel::component::{Blittable, Component, ComponentTier, ComponentTypeId, Managed};
use simkernel::events::Event;
use simkernel::scheduler::{DataStrategy, ModuleSpec, Phase, SyncSystem};
use simkernel::view::View;
use simkernel::{Entity, Kernel, KernelConfig};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Health {
    current: i32,
}
impl Component for Health {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(0);
    const TYPE_NAME: &'static str = "Health";
    const TIER: ComponentTier = ComponentTier::Blittable;
}
unsafe impl Blittable for Health {}

#[derive(Debug, Clone, PartialEq)]
struct DisplayName(String);
impl Component for DisplayName {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(1);
    const TYPE_NAME: &'static str = "DisplayName";
    const TIER: ComponentTier = ComponentTier::Managed;
}
impl Managed for DisplayName {}

struct Explosion {
    id: u32,
}
impl Event for Explosion {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(2);
    const TYPE_NAME: &'static str = "Explosion";
}

/// A 10 Hz consumer catches up on five events published
/// while it wasn't due, in order, the first time it runs.
#[test]
fn slow_consumer_catches_up_on_all_buffered_events() {
    let mut config = KernelConfig::default();
    config.frame_rate_hz = 60.0;
    let mut kernel = Kernel::new(config);
    kernel.store_mut().register_blittable::<Health>().unwrap();

    let mut next_id = 0u32;
    kernel.scheduler_mut().register_system(
        SyncSystem::new("explode", Phase::Simulation, Box::new(move |store| {
            next_id += 1;
            store.publish_event(Explosion { id: next_id });
            Ok(())
        }))
        .at_frequency(0.0),
    );

    let seen_ids: Arc<std::sync::Mutex<Vec<u32>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_for_module = seen_ids.clone();
    kernel.scheduler_mut().register_module(
        ModuleSpec::asynchronous(
            "collector",
            DataStrategy::Sod,
            Arc::new(move |view: &View, _cb: &mut CommandBuffer| {
                for e in view.consume_events::<Explosion>() {
                    seen_for_module.lock().unwrap().push(e.id);
                }
                Ok(())
            }),
        )
        .frequency_hz(10.0)
        .watching_events(ComponentMask::single(Explosion::TYPE_ID)),
    );
    kernel.build().unwrap();

    // Frames 1..5 publish explosions 1..5; the 10 Hz consumer's timer
    // wouldn't fire that often at 60 Hz, but it's also watching the event
    // type, so it's due on the very first frame that has one.
    for _ in 0..5 {
        kernel.run_frame();
    }
    for _ in 0..200 {
        if kernel.scheduler_mut().all_async_idle() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
        kernel.scheduler_mut().harvest(kernel.store_mut());
    }

    let seen = seen_ids.lock().unwrap().clone();
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

/// A command recorded against a stale generation is dropped
/// at playback rather than aborting the buffer or reviving the entity.
#[test]
fn stale_command_buffer_entry_is_dropped_fail_soft() {
    let mut kernel = Kernel::new(KernelConfig::default());
    kernel.store_mut().register_blittable::<Health>().unwrap();
    kernel.scheduler_mut().register_system(SyncSystem::new(
        "noop",
        Phase::Simulation,
        Box::new(|_store| Ok(())),
    ));
    kernel.build().unwrap();

    let entity = kernel.store_mut().create_entity();
    kernel
        .store_mut()
        .set_blittable(entity, Health { current: 10 })
        .unwrap();

    let mut stale_write = CommandBuffer::new();
    stale_write.set_blittable(entity, Health { current: 0 });

    kernel.store_mut().destroy_entity(entity).unwrap();

    let stats = simkernel::cmdbuf::playback(stale_write, kernel.store_mut());
    assert_eq!(stats.validation_failed, 1);
    assert_eq!(stats.applied, 0);
    assert!(!kernel.store().is_alive(entity));
}

/// Two asynchronous modules with identical
/// `(mode, strategy, frequency)` but disjoint masks share one provider,
/// and both see the same tick from it within one dispatch.
#[test]
fn convoy_members_share_one_provider_and_tick() {
    let mut kernel = Kernel::new(KernelConfig::default());
    kernel.store_mut().register_blittable::<Health>().unwrap();
    kernel.store_mut().register_managed::<DisplayName>().unwrap();

    let ticks_a = Arc::new(std::sync::Mutex::new(Vec::new()));
    let ticks_b = Arc::new(std::sync::Mutex::new(Vec::new()));
    let ticks_a_for_module = ticks_a.clone();
    let ticks_b_for_module = ticks_b.clone();

    kernel.scheduler_mut().register_module(
        ModuleSpec::asynchronous(
            "reader-a",
            DataStrategy::Sod,
            Arc::new(move |view: &View, _cb| {
                ticks_a_for_module.lock().unwrap().push(view.tick());
                Ok(())
            }),
        )
        .frequency_hz(5.0)
        .requiring_components(ComponentMask::single(Health::TYPE_ID)),
    );
    kernel.scheduler_mut().register_module(
        ModuleSpec::asynchronous(
            "reader-b",
            DataStrategy::Sod,
            Arc::new(move |view: &View, _cb| {
                ticks_b_for_module.lock().unwrap().push(view.tick());
                Ok(())
            }),
        )
        .frequency_hz(5.0)
        .requiring_components(ComponentMask::single(DisplayName::TYPE_ID)),
    );
    kernel.build().unwrap();

    assert_eq!(
        kernel.scheduler_mut().group_of("reader-a"),
        kernel.scheduler_mut().group_of("reader-b")
    );

    // Both modules are 5 Hz against the default 60 Hz frame rate, so they're
    // only due once every 12 ticks.
    for _ in 0..12 {
        kernel.run_frame();
    }
    for _ in 0..200 {
        if kernel.scheduler_mut().all_async_idle() {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
        kernel.scheduler_mut().harvest(kernel.store_mut());
    }

    let a = ticks_a.lock().unwrap().clone();
    let b = ticks_b.lock().unwrap().clone();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0], b[0]);
}

/// Entity generation round-trips through its 64-bit wire form, and a
/// destroyed-then-recreated id never satisfies the old handle.
#[test]
fn entity_bits_round_trip_and_generation_invalidates_old_handle() {
    let mut kernel = Kernel::new(KernelConfig::default());
    kernel.store_mut().register_blittable::<Health>().unwrap();

    let first = kernel.store_mut().create_entity();
    let bits = first.to_bits();
    assert_eq!(Entity::from_bits(bits), first);

    kernel.store_mut().destroy_entity(first).unwrap();
    let second = kernel.store_mut().create_entity();
    assert_eq!(first.id, second.id);
    assert!(!kernel.store().is_alive(first));
    assert!(kernel.store().is_alive(second));
}

#[test]
fn component_count_tracks_set_and_remove() {
    static CALLS: AtomicU32 = AtomicU32::new(0);
    let mut kernel = Kernel::new(KernelConfig::default());
    kernel.store_mut().register_blittable::<Health>().unwrap();
    kernel.scheduler_mut().register_system(SyncSystem::new(
        "touch",
        Phase::Simulation,
        Box::new(|_store| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    ));
    kernel.build().unwrap();

    let e = kernel.store_mut().create_entity();
    kernel
        .store_mut()
        .set_blittable(e, Health { current: 5 })
        .unwrap();
    assert!(kernel.store().contains::<Health>(e));
    kernel
        .store_mut()
        .remove_component::<Health>(e)
        .unwrap();
    assert!(!kernel.store().contains::<Health>(e));

    kernel.run_frame();
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}
