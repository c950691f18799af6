//! Benchmarks for spark-properties
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spark_properties::{
    BulkLoadSession, BulkTransactionCoordinator, DerivedProperty, Emitter, EmitterOptions,
    Listener, Phase, Property, ReentrantOrder,
};

// =============================================================================
// PROPERTY BENCHMARKS
// =============================================================================

fn bench_property_create(c: &mut Criterion) {
    c.bench_function("property_create", |b| {
        b.iter(|| black_box(Property::new(0i32)))
    });
}

fn bench_property_get(c: &mut Criterion) {
    let p = Property::new(42i32);
    c.bench_function("property_get", |b| b.iter(|| black_box(p.get())));
}

fn bench_property_set(c: &mut Criterion) {
    let p = Property::new(0i32);
    let mut n = 0;
    c.bench_function("property_set", |b| {
        b.iter(|| {
            n += 1;
            p.set(black_box(n))
        })
    });
}

fn bench_property_set_same_value(c: &mut Criterion) {
    let p = Property::new(42i32);
    c.bench_function("property_set_same_value", |b| {
        b.iter(|| p.set(black_box(42)))
    });
}

fn bench_property_set_with_listeners(c: &mut Criterion) {
    let mut group = c.benchmark_group("property_set_with_listeners");
    for count in [1usize, 10, 100] {
        let p = Property::new(0i32);
        for _ in 0..count {
            p.lazy_link(|v, _, _| {
                black_box(v);
            })
            .unwrap();
        }
        let mut n = 0;
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                n += 1;
                p.set(n)
            })
        });
    }
    group.finish();
}

// =============================================================================
// DERIVED BENCHMARKS
// =============================================================================

fn bench_derived_create(c: &mut Criterion) {
    let p = Property::new(0i32);
    c.bench_function("derived_create", |b| {
        b.iter(|| black_box(DerivedProperty::derived1(&p, |v| v * 2)))
    });
}

fn bench_derived_chain(c: &mut Criterion) {
    let source = Property::new(0i32);
    let mut chain = vec![DerivedProperty::derived1(&source, |v| v + 1).unwrap()];
    for _ in 0..9 {
        let last = chain[chain.len() - 1].read_only();
        chain.push(DerivedProperty::derived1(&last, |v| v + 1).unwrap());
    }
    let mut n = 0;
    c.bench_function("derived_chain_10", |b| {
        b.iter(|| {
            n += 1;
            source.set(n).unwrap();
            black_box(chain[9].get())
        })
    });
}

// =============================================================================
// EMITTER BENCHMARKS
// =============================================================================

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("emit");
    for order in [ReentrantOrder::Stack, ReentrantOrder::Queue] {
        let emitter: Emitter<(i32,)> =
            Emitter::with_options(EmitterOptions::new().reentrant_order(order)).unwrap();
        for _ in 0..10 {
            emitter
                .listen(|(n,): &(i32,)| {
                    black_box(n);
                })
                .unwrap();
        }
        group.bench_function(format!("{order:?}"), |b| b.iter(|| emitter.emit((black_box(1),))));
    }
    group.finish();
}

fn bench_emit_with_mutation(c: &mut Criterion) {
    let emitter: Emitter<()> = Emitter::new();
    for _ in 0..10 {
        emitter.listen(|_| {}).unwrap();
    }
    let churn = Listener::new(|_: &()| {});
    emitter
        .listen({
            let (emitter, churn) = (emitter.clone(), churn.clone());
            move |_| {
                if emitter.has_listener(&churn) {
                    emitter.remove_listener(&churn).unwrap();
                } else {
                    emitter.add_listener(&churn).unwrap();
                }
            }
        })
        .unwrap();
    c.bench_function("emit_with_mutation", |b| b.iter(|| emitter.emit(())));
}

// =============================================================================
// TRANSACTION BENCHMARKS
// =============================================================================

fn bench_bulk_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_load_chain");
    for size in [10usize, 100] {
        let mut coordinator = BulkTransactionCoordinator::new();
        let values: Vec<Property<usize>> = (0..size).map(Property::new).collect();
        for pair in values.windows(2) {
            coordinator
                .register_order_dependency(pair[0].id(), Phase::Finalize, pair[1].id(), Phase::Finalize)
                .unwrap();
        }
        let mut n = 0;
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                n += 1;
                let session = BulkLoadSession::begin(
                    &coordinator,
                    values.iter().map(Property::as_deferrable).collect(),
                )
                .unwrap();
                for value in &values {
                    value.set(n).unwrap();
                }
                black_box(session.finish().unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(
    property_benches,
    bench_property_create,
    bench_property_get,
    bench_property_set,
    bench_property_set_same_value,
    bench_property_set_with_listeners,
);

criterion_group!(derived_benches, bench_derived_create, bench_derived_chain);

criterion_group!(emitter_benches, bench_emit, bench_emit_with_mutation);

criterion_group!(transaction_benches, bench_bulk_load);

criterion_main!(property_benches, derived_benches, emitter_benches, transaction_benches);
