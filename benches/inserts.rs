use criterion::{black_box, criterion_group, criterion_main, Criterion};
use simkernel::component::{Blittable, Component, ComponentTier, ComponentTypeId};
use simkernel::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}
impl Component for Position {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(0);
    const TYPE_NAME: &'static str = "Position";
    const TIER: ComponentTier = ComponentTier::Blittable;
}
unsafe impl Blittable for Position {}

fn bench_set_blittable_sequential(c: &mut Criterion) {
    c.bench_function("set_blittable_10k_sequential", |b| {
        b.iter(|| {
            let mut store = Store::new(1024);
            store.register_blittable::<Position>().unwrap();
            for i in 0..10_000u32 {
                let e = store.create_entity();
                store
                    .set_blittable(e, Position { x: i as f32, y: 0.0, z: 0.0 })
                    .unwrap();
            }
            black_box(&store);
        });
    });
}

fn bench_set_blittable_re_upsert(c: &mut Criterion) {
    let mut store = Store::new(1024);
    store.register_blittable::<Position>().unwrap();
    let entities: Vec<_> = (0..10_000)
        .map(|_| {
            let e = store.create_entity();
            store.set_blittable(e, Position::default()).unwrap();
            e
        })
        .collect();

    c.bench_function("set_blittable_10k_re_upsert", |b| {
        b.iter(|| {
            for &e in &entities {
                store.set_blittable(e, Position { x: 1.0, y: 2.0, z: 3.0 }).unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_set_blittable_sequential, bench_set_blittable_re_upsert);
criterion_main!(benches);
