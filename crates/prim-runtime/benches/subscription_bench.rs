//! Benchmarks for store updates and selection-level subscriptions.
//!
//! Run with: `cargo bench --package prim-runtime --bench subscription_bench`
//!
//! Compares the batched (fast) and per-call (legacy) subscription strategies
//! for units that read several slices from one or more stores. The fast path
//! should stay flat in the number of `use_store` calls per unit when it comes
//! to subscriptions, since each unit holds one listener per distinct store.
//!
//! # Criterion Output
//!
//! Results are written to `target/criterion/` under one directory per group.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use prim_core::{Key, Patch, Selector, Store, create_selector, key};
use prim_runtime::{ReactStore, RenderUnit, Runtime, RuntimeConfig, SubscriptionStrategy, use_store};
use std::hint::black_box;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq)]
struct Row {
    open: bool,
    highlighted: i32,
    value: i32,
}

const OPEN: Key<Row, bool> = key!(Row, open: bool);
const HIGHLIGHTED: Key<Row, i32> = key!(Row, highlighted: i32);
const VALUE: Key<Row, i32> = key!(Row, value: i32);

const STRATEGIES: [SubscriptionStrategy; 2] =
    [SubscriptionStrategy::Fast, SubscriptionStrategy::Legacy];

fn runtime(strategy: SubscriptionStrategy) -> Runtime {
    Runtime::new(
        RuntimeConfig::default()
            .with_subscription(strategy)
            .with_dev_checks(false),
    )
}

/// `count` selectors over distinct projections of `Row`.
fn selectors(count: usize) -> Vec<Selector<Row, i32>> {
    (0..count)
        .map(|i| {
            let shift = i as i32;
            create_selector(move |row: &Row| match shift % 3 {
                0 => row.value + shift,
                1 => row.highlighted - shift,
                _ => i32::from(row.open) * shift,
            })
        })
        .collect()
}

fn render_all(
    rt: &Runtime,
    unit: &RenderUnit,
    stores: &[ReactStore<Row>],
    selectors: &[Selector<Row, i32>],
) -> i32 {
    rt.render(unit, |cx| {
        let mut sum = 0;
        for (i, selector) in selectors.iter().enumerate() {
            sum += use_store(cx, &stores[i % stores.len()], selector);
        }
        sum
    })
}

// ============================================================================
// Store Updates
// ============================================================================

fn bench_store_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_apply");

    for listeners in [1usize, 16, 256] {
        let store = Store::new(Row::default());
        let subs: Vec<_> = (0..listeners)
            .map(|_| {
                store.subscribe(|row| {
                    black_box(row.value);
                })
            })
            .collect();

        group.throughput(Throughput::Elements(listeners as u64));
        group.bench_with_input(
            BenchmarkId::new("two_key_patch", listeners),
            &store,
            |b, store| {
                let mut n = 0;
                b.iter(|| {
                    n += 1;
                    store.apply(Patch::new().set(VALUE, n).set(HIGHLIGHTED, -n));
                });
            },
        );
        group.bench_with_input(
            BenchmarkId::new("equal_patch", listeners),
            &store,
            |b, store| {
                let current = store.state().value;
                b.iter(|| store.apply(Patch::new().set(VALUE, black_box(current))));
            },
        );
        drop(subs);
    }

    group.finish();
}

// ============================================================================
// use_store Re-render Cycles
// ============================================================================

fn bench_rerender(c: &mut Criterion) {
    let mut group = c.benchmark_group("use_store_rerender");

    for strategy in STRATEGIES {
        for calls in [1usize, 4, 16] {
            let rt = runtime(strategy);
            let stores = vec![ReactStore::new(Row::default()), ReactStore::new(Row::default())];
            let selectors = selectors(calls);
            let unit = rt.create_unit();
            render_all(&rt, &unit, &stores, &selectors);

            group.throughput(Throughput::Elements(calls as u64));
            group.bench_function(BenchmarkId::new(strategy.as_str(), calls), |b| {
                let mut n = 0;
                b.iter(|| {
                    n += 1;
                    stores[0].set(VALUE, n);
                    stores[1].set(HIGHLIGHTED, n);
                    black_box(render_all(&rt, &unit, &stores, &selectors))
                });
            });
            rt.unmount(&unit);
        }
    }

    group.finish();
}

// ============================================================================
// Fan-out Across Units
// ============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for strategy in STRATEGIES {
        for units in [8usize, 128] {
            let rt = runtime(strategy);
            let store = ReactStore::new(Row::default());
            let stores = [store.clone()];
            let selectors = selectors(3);
            let units: Vec<RenderUnit> = (0..units).map(|_| rt.create_unit()).collect();
            for unit in &units {
                render_all(&rt, unit, &stores, &selectors);
            }

            group.throughput(Throughput::Elements(units.len() as u64));
            group.bench_function(BenchmarkId::new(strategy.as_str(), units.len()), |b| {
                let mut open = false;
                b.iter(|| {
                    open = !open;
                    store.set(OPEN, open);
                    let mut rendered = 0usize;
                    for unit in &units {
                        if rt.render_if_needed(unit, |cx| {
                            for selector in &selectors {
                                black_box(use_store(cx, &store, selector));
                            }
                        }) {
                            rendered += 1;
                        }
                    }
                    rendered
                });
            });
            for unit in &units {
                rt.unmount(unit);
            }
        }
    }

    group.finish();
}

criterion_group!(benches, bench_store_apply, bench_rerender, bench_fan_out);
criterion_main!(benches);
