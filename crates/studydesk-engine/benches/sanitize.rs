use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use studydesk_engine::sanitize::sanitize;
mod common;

fn bench_sanitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitize");

    for size in [10, 100, 1000] {
        let clean = common::generate_note_markup(size);
        group.bench_with_input(BenchmarkId::new("canonical", size), &clean, |b, markup| {
            b.iter(|| sanitize(std::hint::black_box(markup)));
        });

        let pasted = common::generate_pasted_markup(size);
        group.bench_with_input(BenchmarkId::new("pasted", size), &pasted, |b, markup| {
            b.iter(|| sanitize(std::hint::black_box(markup)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sanitize);
criterion_main!(benches);
