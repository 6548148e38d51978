//! Benchmarks for strata-core pool and property operations.
//!
//! Run with: cargo bench -p strata-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata_core::{Frame, ImageFormat, ImageRequest, MemoryPool, Properties};

fn bench_pool(c: &mut Criterion) {
    let pool = MemoryPool::new();
    // Warm the class so the loop measures reuse, not carving.
    drop(pool.alloc(720 * 576 * 3));

    c.bench_function("pool_alloc_release_pal_rgb24", |bencher| {
        bencher.iter(|| {
            let buffer = pool.alloc(black_box(720 * 576 * 3)).ok();
            black_box(buffer)
        });
    });

    c.bench_function("pool_alloc_release_1k", |bencher| {
        bencher.iter(|| black_box(pool.alloc(black_box(1000)).ok()));
    });
}

fn bench_properties(c: &mut Criterion) {
    let props = Properties::new();
    for i in 0..64 {
        let _ = props.set_int(&format!("key{i}"), i);
    }

    c.bench_function("properties_set_int", |bencher| {
        bencher.iter(|| props.set_int(black_box("key32"), black_box(7)));
    });

    c.bench_function("properties_get_double_from_string", |bencher| {
        let _ = props.set("gamma", "1.25");
        bencher.iter(|| props.get_double(black_box("gamma")));
    });
}

fn bench_test_card(c: &mut Criterion) {
    let pool = MemoryPool::new();
    c.bench_function("frame_test_card_pal", |bencher| {
        bencher.iter(|| {
            let frame = Frame::new(&pool);
            black_box(frame.get_image(ImageRequest::new(ImageFormat::Rgb24, 720, 576)).ok())
        });
    });
}

criterion_group!(benches, bench_pool, bench_properties, bench_test_card);
criterion_main!(benches);
