//! R-Tree benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use strongbox::store::{FileStore, FileStoreConfig, MemoryStore, ObjectStore};
use strongbox::Handle;
use strongbox_spatial::{Rect, SpatialConfig, SpatialIndex};
use tempfile::tempdir;

fn grid_rect(i: u64) -> Rect<f64, 2> {
    let x = (i % 100) as f64;
    let y = (i / 100) as f64;
    Rect::xy(x, y, x + 1.0, y + 1.0)
}

fn bench_memory_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("SpatialIndex Insert (memory)");

    for size in [100u64, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || {
                    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
                    SpatialIndex::<f64, 2>::create(store, SpatialConfig::default()).unwrap()
                },
                |index| {
                    for i in 0..size {
                        index.insert(grid_rect(i), Handle::new(i + 1)).unwrap();
                    }
                    black_box(index.size())
                },
            );
        });
    }

    group.finish();
}

fn bench_file_insert_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("SpatialIndex Insert + Commit (file)");

    for size in [100u64, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || {
                    let dir = tempdir().unwrap();
                    let config =
                        FileStoreConfig::new(dir.path().join("bench.sbx")).sync_on_commit(false);
                    let store: Arc<dyn ObjectStore> = Arc::new(FileStore::open(config).unwrap());
                    let index =
                        SpatialIndex::<f64, 2>::create(store, SpatialConfig::default()).unwrap();
                    (index, dir)
                },
                |(index, _dir)| {
                    for i in 0..size {
                        index.insert(grid_rect(i), Handle::new(i + 1)).unwrap();
                    }
                    index.commit().unwrap();
                    black_box(index.size())
                },
            );
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("SpatialIndex Search");

    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let index = SpatialIndex::<f64, 2>::create(store, SpatialConfig::default()).unwrap();

    // Populate index
    for i in 0..10000 {
        index.insert(grid_rect(i), Handle::new(i + 1)).unwrap();
    }

    group.bench_function("search_10k", |b| {
        b.iter(|| {
            let query = Rect::xy(25.0, 25.0, 75.0, 75.0);
            black_box(index.search(&query).unwrap())
        });
    });

    group.bench_function("iter_10k", |b| {
        b.iter(|| {
            let query = Rect::xy(25.0, 25.0, 75.0, 75.0);
            black_box(index.iter(query).filter_map(Result::ok).count())
        });
    });

    group.bench_function("search_10k_cold", |b| {
        index.flush().unwrap();
        b.iter(|| {
            index.release_clean_pages();
            let query = Rect::xy(40.0, 40.0, 45.0, 45.0);
            black_box(index.search(&query).unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_memory_insert,
    bench_file_insert_commit,
    bench_search
);
criterion_main!(benches);
