//! Allocation and collection-cycle benchmarks for the cell allocator.
//!
//! Run with `cargo bench --package protocore-gc`.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use protocore_gc::cell::{register_kind, CellKind, CellPtr};
use protocore_gc::{GarbageCollector, GcConfig};
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

fn leaf_kind() -> CellKind {
    fn visit(_cell: CellPtr, _visit: &mut dyn FnMut(CellPtr)) {}
    INIT.call_once(|| register_kind(CellKind(9), visit, None));
    CellKind(9)
}

fn bench_config(cells: usize) -> GcConfig {
    GcConfig {
        min_heap_cells: cells,
        max_heap_cells: cells * 4,
        cells_per_block: cells,
        thread_free_list_batch: 64,
        gc_threads: Some(2),
        ..Default::default()
    }
}

fn bench_gc_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_creation");

    group.bench_function("default_config", |b| {
        b.iter(|| black_box(GarbageCollector::new(GcConfig::default()).unwrap()))
    });

    group.bench_function("small_heap", |b| {
        b.iter(|| black_box(GarbageCollector::new(bench_config(4096)).unwrap()))
    });

    group.finish();
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");
    let gc = GarbageCollector::new(bench_config(1 << 16)).unwrap();
    let _thread = gc.register_thread("bench");
    let kind = leaf_kind();

    group.bench_function("single_cell", |b| {
        b.iter(|| black_box(gc.allocate(kind).unwrap()))
    });

    group.bench_function("burst_1000", |b| {
        b.iter(|| {
            for _ in 0..1000 {
                black_box(gc.allocate(kind).unwrap());
            }
        })
    });

    group.finish();
}

fn bench_gc_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_cycle");
    let gc = GarbageCollector::new(bench_config(1 << 14)).unwrap();
    let _thread = gc.register_thread("bench");
    let kind = leaf_kind();

    let rooted = gc.allocate(kind).unwrap();
    struct FixedRoot(Mutex<CellPtr>);
    impl protocore_gc::marker::RootProvider for FixedRoot {
        fn visit_roots(&self, visit: &mut dyn FnMut(CellPtr)) {
            visit(*self.0.lock().unwrap());
        }
    }
    let _handle = gc.register_roots(Arc::new(FixedRoot(Mutex::new(rooted))));

    group.bench_function("full_cycle_mostly_garbage", |b| {
        b.iter(|| {
            for _ in 0..500 {
                let _ = gc.allocate(kind);
            }
            gc.trigger_gc().unwrap();
        })
    });

    group.finish();
}

fn bench_config_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("config_validation");

    group.bench_function("default", |b| {
        b.iter(|| black_box(GcConfig::default().validate()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_gc_creation,
    bench_allocation,
    bench_gc_cycle,
    bench_config_validation,
);
criterion_main!(benches);
