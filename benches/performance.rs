#![allow(missing_docs)]

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use nestore::{Dict, Nestore, Value, dict};
use std::hint::black_box;

const SWEEPS: usize = 64;
const POINTS: usize = 16_384;

fn generate_data(sweeps: usize) -> Dict {
    let traces: Dict = (0..sweeps)
        .map(|s| {
            let samples: Vec<f64> = (0..POINTS).map(|i| ((i + s) as f64 * 0.001).sin()).collect();
            (
                format!("sweep_{s:03}"),
                Value::dict([
                    ("samples", Value::from(samples)),
                    ("index", Value::from(s as i64)),
                ]),
            )
        })
        .collect();
    dict([
        ("traces", Value::Dict(traces)),
        ("label", Value::from("bench")),
    ])
}

// --- BENCHMARKS ---

fn bench_writers(c: &mut Criterion) {
    let data = generate_data(SWEEPS);
    let raw = nestore::normalized(Value::Dict(data.clone())).expect("normalizable");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bench_write.nst");

    println!("Writers sweep count: {}", SWEEPS);

    let mut group = c.benchmark_group("Container Write");
    group.throughput(Throughput::Bytes((SWEEPS * POINTS * 8) as u64));

    // 1. Baseline: bincode of the normalized tree (single threaded, no I/O)
    if let Value::Dict(normalized) = &raw {
        let arrays: Vec<_> = normalized["traces"]
            .as_dict()
            .into_iter()
            .flat_map(|t| t.values())
            .filter_map(|sweep| sweep.as_dict().and_then(|d| d["samples"].as_array()))
            .collect();
        group.bench_function("bincode_arrays", |b| {
            b.iter(|| {
                bincode::serde::encode_to_vec(black_box(&arrays), bincode::config::standard())
                    .expect("Bincode serialization failed");
            });
        });
    }

    // 2. Nestore, default compression
    group.bench_function("nestore_write", |b| {
        b.iter(|| {
            Nestore::write(&path, black_box(data.clone())).expect("Failed to write container");
        });
    });

    // 3. Nestore, raw payloads
    let plain = Nestore::options().compression(false);
    group.bench_function("nestore_write_uncompressed", |b| {
        b.iter(|| {
            plain
                .write(&path, black_box(data.clone()))
                .expect("Failed to write container");
        });
    });

    // 4. Single key replaced, everything else carried over
    Nestore::write(&path, data.clone()).expect("Failed to write container");
    group.bench_function("nestore_replace_one_key", |b| {
        b.iter(|| {
            Nestore::write(&path, dict([("label", Value::from("again"))]))
                .expect("Failed to write container");
        });
    });

    group.finish();
}

fn bench_readers(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bench_read.nst");
    Nestore::write(&path, generate_data(SWEEPS)).expect("Failed to write container");

    let report = Nestore::inspect(&path).expect("Failed to inspect");
    println!("Container size: {}b", report.file_size);

    let mut group = c.benchmark_group("Container Read");

    // 1. Full load
    group.bench_function("nestore_read_all", |b| {
        b.iter(|| {
            let _res = Nestore::read(&path, None::<&str>).expect("Failed to read");
        });
    });

    // 2. Surgical access to a single leaf
    group.bench_function("nestore_read_path", |b| {
        b.iter(|| {
            let v = Nestore::read_path(&path, black_box("traces/sweep_031/samples"))
                .expect("Failed to read path");
            black_box(v);
        });
    });

    // 3. Keys only
    group.bench_function("nestore_list_keys", |b| {
        b.iter(|| black_box(Nestore::list_keys(&path).expect("Failed to list keys")));
    });

    group.finish();
}

criterion_group!(benches, bench_writers, bench_readers);
criterion_main!(benches);
