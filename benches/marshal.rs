//! Benchmarks for the argument marshaling hot path.

use criterion::{criterion_group, criterion_main, Criterion};
use fnbridge::testing::{StubArray, StubRuntime};
use fnbridge::{call_args, export_function, CallArgs};
use std::hint::black_box;

/// Benchmark building and partitioning argument lists.
fn bench_call_args(c: &mut Criterion) {
    let mut group = c.benchmark_group("call_args");

    group.bench_function("build_mixed_8", |b| {
        b.iter(|| {
            let args = CallArgs::new()
                .positional(StubArray::new(1))
                .positional(StubArray::new(2))
                .positional(StubArray::new(3))
                .positional(StubArray::new(4))
                .keyword("scale", StubArray::new(5))
                .keyword("bias", StubArray::new(6))
                .keyword("offset", StubArray::new(7))
                .keyword("mask", StubArray::new(8));
            black_box(args)
        })
    });

    group.bench_function("partition_with_duplicates", |b| {
        let args = CallArgs::new()
            .positional(StubArray::new(1))
            .keyword("scale", StubArray::new(2))
            .keyword("bias", StubArray::new(3))
            .keyword("scale", StubArray::new(4))
            .positional(StubArray::new(5));
        b.iter(|| {
            let positional: Vec<&StubArray> = args.positional_values().collect();
            let keywords = args.keyword_entries();
            black_box((positional, keywords))
        })
    });

    group.finish();
}

/// Benchmark a full single-shot export against the stub engine.
fn bench_stub_export(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let dest = dir.path().join("bench.fnpkg");
    let runtime = StubRuntime::new();

    c.bench_function("single_shot_export", |b| {
        b.iter(|| {
            let exporter = export_function(runtime.clone(), &dest, |arrays| arrays.to_vec());
            exporter
                .export(&call_args![
                    StubArray::new(1),
                    StubArray::new(2),
                    scale = StubArray::new(3)
                ])
                .expect("export");
        })
    });
}

criterion_group!(benches, bench_call_args, bench_stub_export);
criterion_main!(benches);
