//! Benchmarks for the context lifecycle.

use appctx::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn registry() -> Arc<PropertyRegistry> {
    PropertyRegistry::new([
        (
            "depth",
            PropertyDefinition::typed(|_, parent: Option<Arc<u32>>| Ok(parent.map_or(0, |p| *p + 1))),
        ),
        (
            "resource",
            PropertyDefinition::shared(()).with_dispose_fn(|_, _| Ok(())),
        ),
    ])
    .unwrap()
}

fn context_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let root = rt.block_on(create_root(registry(), None)).unwrap();

    c.bench_function("child_get_done", |b| {
        b.iter(|| {
            rt.block_on(async {
                let kid = root.child().await.unwrap();
                black_box(kid.get_as::<u32>("depth").await.unwrap());
                kid.get("resource").await.unwrap();
                kid.done().await.unwrap();
            });
        });
    });

    c.bench_function("cached_get", |b| {
        let kid = rt.block_on(root.child()).unwrap();
        rt.block_on(kid.get("depth")).unwrap();
        b.iter(|| black_box(rt.block_on(kid.get("depth")).unwrap()));
    });
}

criterion_group!(benches, context_benchmark);
criterion_main!(benches);
