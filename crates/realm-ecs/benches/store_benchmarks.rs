//! Entity store benchmarks: indexed queries vs. full scans, and update cost.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use realm_ecs::prelude::*;
use serde_json::json;

const CITIES: [&str; 8] = ["Karth", "Vell", "Ostra", "Dun", "Mire", "Asp", "Holt", "Rook"];

fn populated_store(n: usize) -> EntityStore {
    let mut store = EntityStore::new();
    for i in 0..n {
        let ty = if i % 5 == 0 { "merchant" } else { "npc" };
        let mut entity = Entity::new(format!("e{i}"), ty).with_component(
            "position",
            json!({"realm": if i % 2 == 0 { "north" } else { "south" }, "city": CITIES[i % CITIES.len()]}),
        );
        if i % 3 == 0 {
            entity = entity.with_component("stats", json!({"health": 10, "maxHealth": 10}));
        }
        store.add(entity).expect("unique ids");
    }
    store
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_query");
    for n in [1_000usize, 10_000] {
        let store = populated_store(n);

        group.bench_with_input(BenchmarkId::new("indexed_city_type", n), &store, |b, store| {
            let q = EntityQuery::new().entity_type("merchant").city("Vell");
            b.iter(|| black_box(store.query(&q).len()));
        });

        group.bench_with_input(BenchmarkId::new("predicate_scan", n), &store, |b, store| {
            let q = EntityQuery::new().filter(|e| e.entity_type == "merchant" && e.city() == Some("Vell"));
            b.iter(|| black_box(store.query(&q).len()));
        });
    }
    group.finish();
}

fn bench_updates(c: &mut Criterion) {
    let mut store = populated_store(10_000);
    let mut i = 0usize;
    c.bench_function("store_update_reindex", |b| {
        b.iter(|| {
            let id = format!("e{}", i % 10_000);
            i += 1;
            store.update(
                &id,
                EntityPatch::new().merge("position", json!({"city": CITIES[i % CITIES.len()]})),
            )
        })
    });
}

criterion_group!(benches, bench_queries, bench_updates);
criterion_main!(benches);
