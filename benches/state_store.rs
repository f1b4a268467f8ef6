//! Benchmark for the instance state store
//!
//! Registration and configuration writes contend on separate locks.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use instance_listener::state::{InstanceConfig, StateStore};
use std::sync::Arc;

fn bench_register_address(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_store");
    group.throughput(Throughput::Elements(1));

    group.bench_function("register_address", |b| {
        let store = StateStore::new();
        let mut counter = 0u64;

        b.iter(|| {
            counter += 1;
            let identity = format!("52:54:00:00:{:02x}:{:02x}", (counter >> 8) & 0xff, counter & 0xff);
            store.register_address(black_box(&identity), black_box("10.0.0.7"));
        });
    });

    group.finish();
}

fn bench_lookup_config(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_store");
    group.throughput(Throughput::Elements(1));

    // Pre-assign configuration
    let store = StateStore::new();
    for i in 0..1000 {
        let mut env = InstanceConfig::new();
        env.insert("INSTANCE_INDEX".to_string(), i.to_string());
        store.set_config(&format!("mac-{:04}", i), env);
    }

    group.bench_function("lookup_config", |b| {
        let mut counter = 0u64;
        b.iter(|| {
            counter += 1;
            let identity = format!("mac-{:04}", counter % 1000);
            black_box(store.lookup_config(black_box(&identity)));
        });
    });

    group.finish();
}

fn bench_concurrent_registrations(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_store");
    group.throughput(Throughput::Elements(100));

    let store = Arc::new(StateStore::new());
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("concurrent_100_registrations", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut handles = Vec::new();
                for i in 0..100 {
                    let store = store.clone();
                    handles.push(tokio::spawn(async move {
                        store.register_address(&format!("mac-{:04}", i), "10.0.0.7");
                        store.lookup_config(&format!("mac-{:04}", i))
                    }));
                }
                for handle in handles {
                    let _ = handle.await;
                }
            });
        });
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_store");

    let store = StateStore::new();
    for i in 0..1000 {
        store.register_address(&format!("mac-{:04}", i), "10.0.0.7");
    }

    group.bench_function("snapshot_1000", |b| {
        b.iter(|| black_box(store.snapshot().to_vec()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_register_address,
    bench_lookup_config,
    bench_concurrent_registrations,
    bench_snapshot,
);
criterion_main!(benches);
