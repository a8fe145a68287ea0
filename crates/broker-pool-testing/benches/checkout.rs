//! Benchmarks for pool checkout and return.

#![allow(clippy::unwrap_used, missing_docs)]

use broker_pool::Pool;
use broker_pool_testing::MockLifecycle;
use criterion::{Criterion, criterion_group, criterion_main};

fn bench_checkout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let pool = Pool::builder(MockLifecycle::new())
        .base_size(4)
        .overflow(0)
        .build()
        .unwrap();
    rt.block_on(pool.warm_up()).unwrap();

    c.bench_function("get_release", |b| {
        b.to_async(&rt).iter(|| async {
            let conn = pool.get().await.unwrap();
            drop(conn);
        });
    });

    c.bench_function("try_get_release", |b| {
        b.iter(|| {
            let conn = pool.try_get().unwrap();
            drop(conn);
        });
    });

    let unpooled = Pool::unpooled(MockLifecycle::new());
    c.bench_function("unpooled_get_release", |b| {
        b.to_async(&rt).iter(|| async {
            let conn = unpooled.get().await.unwrap();
            drop(conn);
        });
    });
}

criterion_group!(benches, bench_checkout);
criterion_main!(benches);
