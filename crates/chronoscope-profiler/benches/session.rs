use std::sync::Arc;
use std::time::Duration;

use chronoscope_profiler::{EntityId, PoolProfiler, Profiler, ProfilerConfig, Tag};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_sessions(c: &mut Criterion) {
    let enabled = Profiler::new(ProfilerConfig::default());
    let disabled = Profiler::new(ProfilerConfig::default().with_enabled(false));
    let tag = Tag::new("Bench", "Scope");

    let mut group = c.benchmark_group("Session lifecycle");

    group.bench_function("begin + dispose (enabled)", |b| {
        b.iter(|| drop(black_box(enabled.begin_scope(tag.clone()))));
    });

    group.bench_function("begin + dispose (disabled)", |b| {
        b.iter(|| drop(black_box(disabled.begin_scope(tag.clone()))));
    });

    group.bench_function("record_duration", |b| {
        let elapsed = Duration::from_micros(40);
        b.iter(|| enabled.record_duration(tag.clone(), black_box(elapsed)));
    });

    group.finish();
}

fn bench_domains(c: &mut Criterion) {
    let profiler = Arc::new(Profiler::default());
    let pools = PoolProfiler::new(Arc::clone(&profiler));
    let pool = EntityId(1);

    let mut group = c.benchmark_group("Domain adapters");

    group.bench_function("pool acquire scope", |b| {
        b.iter(|| pools.begin_acquire_scope(pool, "bullets", 3, 61));
    });

    group.bench_function("entity metrics (cached)", |b| {
        drop(pools.begin_acquire_scope(pool, "bullets", 3, 61));
        b.iter(|| black_box(profiler.entity_metrics(pool)));
    });

    group.finish();
}

criterion_group!(benches, bench_sessions, bench_domains);
criterion_main!(benches);
