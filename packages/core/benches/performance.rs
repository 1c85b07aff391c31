//! Performance benchmarks for TrakHound core operations
//!
//! Run with: `cargo bench -p trakhound-core`
//!
//! These benchmarks measure critical path performance:
//! - Query parsing
//! - Local execution over a snapshot (scan conditions, content rows)
//! - Remote execution through the driver-backed client, cold and warm caches

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use trakhound_core::drivers::{ContentDrivers, ObjectDriver};
use trakhound_core::{
    parse, BooleanEntity, ContentEntity, ContentType, DriverClient, DriverConfig, EngineConfig, EntityCollection,
    NumberEntity, ObjectEntity, QueryEngine, StateEntity,
};

const CONDITION_QUERY: &str =
    "select >> from [plant:/line/*] where [speed] > 50 and ([enabled] = true or state([state]) = 'RUNNING')";
const CONTENT_QUERY: &str = "select * from [plant:/line/*] take 100";

/// A line of `machines` machines, each with speed/enabled/state children
fn generate_plant(machines: usize) -> EntityCollection {
    let mut collection = EntityCollection::new();
    collection.add_objects(ObjectEntity::new("plant", "/line", ContentType::Directory, 1));

    for i in 0..machines {
        let base = format!("/line/m{}", i);
        let children = [
            ObjectEntity::new("plant", &base, ContentType::Directory, 1),
            ObjectEntity::new("plant", &format!("{}/speed", base), ContentType::Number, 1),
            ObjectEntity::new("plant", &format!("{}/enabled", base), ContentType::Boolean, 1),
            ObjectEntity::new("plant", &format!("{}/state", base), ContentType::State, 1),
        ];
        let [Some(machine), Some(speed), Some(enabled), Some(state)] = children else {
            continue;
        };

        collection.add_content(ContentEntity::Number(NumberEntity::new(&speed.uuid, (i % 100) as f64, 10)));
        collection.add_content(ContentEntity::Boolean(BooleanEntity::new(&enabled.uuid, i % 3 == 0, 10)));
        let definition = if i % 2 == 0 { "RUNNING" } else { "IDLE" };
        collection.add_content(ContentEntity::State(StateEntity::new(&state.uuid, definition, 10)));
        collection.add_objects([machine, speed, enabled, state]);
    }
    collection
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_condition_query", |b| {
        b.iter(|| parse(black_box(CONDITION_QUERY)))
    });
}

/// Benchmark local execution over 1000 machines
fn bench_local_execution(c: &mut Criterion) {
    let collection = generate_plant(1000);
    let engine = QueryEngine::new(EngineConfig::default());

    let mut group = c.benchmark_group("local_execution");
    group.bench_function("conditions", |b| {
        b.iter(|| engine.query_local(black_box(CONDITION_QUERY), &collection))
    });
    group.bench_function("content_rows", |b| {
        b.iter(|| engine.query_local(black_box(CONTENT_QUERY), &collection))
    });
    group.finish();
}

/// Benchmark remote execution through the driver cache
///
/// `cold` starts from empty drivers for every iteration; `warm` reuses one client so
/// every lookup after the first iteration is a cache hit.
fn bench_remote_execution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let collection = generate_plant(200);
    let engine = QueryEngine::new(EngineConfig::default());
    let client = |store: EntityCollection| {
        let config = DriverConfig::default();
        DriverClient::new(ObjectDriver::new(config.clone()), ContentDrivers::new(config), store)
    };

    let mut group = c.benchmark_group("remote_execution");
    group.sample_size(20);

    group.bench_function("cold", |b| {
        b.iter_batched(
            || client(collection.clone()),
            |client| {
                rt.block_on(engine.query_remote(CONDITION_QUERY, &client, CancellationToken::new()))
            },
            BatchSize::SmallInput,
        )
    });

    let warm = client(collection.clone());
    group.bench_function("warm", |b| {
        b.iter(|| rt.block_on(engine.query_remote(CONDITION_QUERY, &warm, CancellationToken::new())))
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_local_execution, bench_remote_execution);
criterion_main!(benches);
