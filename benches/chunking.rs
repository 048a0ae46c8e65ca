//! Chunking Benchmarks
//!
//! Performance benchmarks for payload splitting and reassembly at the
//! sizes the store actually handles.
//!
//! Run with: `cargo bench --bench chunking`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use paddock_server::store::{join_fragments, split_payload, CHUNK_SIZE_BYTES};

/// Build a telemetry-shaped JSON payload of roughly `target_bytes`.
fn synthetic_payload(target_bytes: usize) -> String {
    let mut laps = String::new();
    let mut written = 0;
    let mut lap = 0u64;
    while written < target_bytes {
        let entry = format!(
            r#"{{"lapTimeMs": {}, "sectors": [30100, 31200, 31150]}},"#,
            90_000 + lap
        );
        written += entry.len();
        laps.push_str(&entry);
        lap += 1;
    }
    laps.pop(); // trailing comma

    format!(
        r#"{{"track": "Nordschleife", "car": "911 GT3 Cup", "laps": [{laps}]}}"#
    )
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_payload");

    for size in [100_000usize, 1_000_000, 5_000_000] {
        let payload = synthetic_payload(size);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| split_payload(black_box(payload), CHUNK_SIZE_BYTES));
        });
    }

    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let payload = synthetic_payload(1_000_000);
    let fragments = split_payload(&payload, CHUNK_SIZE_BYTES);

    c.bench_function("join_fragments_1mb", |b| {
        b.iter(|| join_fragments(black_box(&fragments)));
    });
}

criterion_group!(benches, bench_split, bench_round_trip);
criterion_main!(benches);
