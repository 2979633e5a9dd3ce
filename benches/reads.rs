use criterion::{black_box, criterion_group, criterion_main, Criterion};
use simkernel::bitmask::ComponentMask;
use simkernel::component::{Blittable, Component, ComponentTier, ComponentTypeId};
use simkernel::store::Store;

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

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(1);
    const TYPE_NAME: &'static str = "Velocity";
    const TIER: ComponentTier = ComponentTier::Blittable;
}
unsafe impl Blittable for Velocity {}

fn populated_store(n: u32) -> (Store, Vec<simkernel::Entity>) {
    let mut store = Store::new(1024);
    store.register_blittable::<Position>().unwrap();
    store.register_blittable::<Velocity>().unwrap();
    let entities: Vec<_> = (0..n)
        .map(|i| {
            let e = store.create_entity();
            store.set_blittable(e, Position { x: i as f32, y: 0.0 }).unwrap();
            if i % 2 == 0 {
                store.set_blittable(e, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
            }
            e
        })
        .collect();
    (store, entities)
}

fn bench_get_blittable(c: &mut Criterion) {
    let (store, entities) = populated_store(10_000);
    c.bench_function("get_blittable_10k", |b| {
        b.iter(|| {
            for &e in &entities {
                black_box(store.get_blittable::<Position>(e).unwrap());
            }
        });
    });
}

fn bench_query_two_component_mask(c: &mut Criterion) {
    let (store, _entities) = populated_store(10_000);
    let mut mask = ComponentMask::empty();
    mask.set(Position::TYPE_ID);
    mask.set(Velocity::TYPE_ID);

    c.bench_function("query_two_component_mask_10k", |b| {
        b.iter(|| black_box(store.query(&mask)));
    });
}

criterion_group!(benches, bench_get_blittable, bench_query_two_component_mask);
criterion_main!(benches);
