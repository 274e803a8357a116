// SPDX-License-Identifier: MIT
//! Benchmarks for stream table mutation and the SPDF codec

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use spdf::{reader, writer, StreamRecord, StreamTable};
use std::hint::black_box;
use tempfile::NamedTempFile;

const STREAMS: usize = 32;

fn create_test_payloads() -> Vec<Vec<u8>> {
    // Mix of small text streams and larger binary ones
    (0..STREAMS)
        .map(|i| {
            if i % 4 == 0 {
                vec![0xFF; 256 * 1024]
            } else {
                format!("stream {} ", i).repeat(64).into_bytes()
            }
        })
        .collect()
}

fn filled_table() -> StreamTable {
    let table = StreamTable::new(STREAMS).unwrap();
    for payload in create_test_payloads() {
        table.add(StreamRecord::new(payload)).unwrap();
    }
    table
}

fn benchmark_add(c: &mut Criterion) {
    let payloads = create_test_payloads();

    c.bench_function("table_add_full", |b| {
        b.iter(|| {
            let table = StreamTable::new(STREAMS).unwrap();
            for payload in &payloads {
                table
                    .add(StreamRecord::new(black_box(payload.clone())))
                    .unwrap();
            }
        })
    });
}

fn benchmark_remove(c: &mut Criterion) {
    c.bench_function("table_remove_all", |b| {
        b.iter_batched(
            filled_table,
            |table| {
                for id in table.ids() {
                    table.remove(black_box(id.as_str())).unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn benchmark_find(c: &mut Criterion) {
    let table = filled_table();
    let last = table.ids().pop().unwrap();

    c.bench_function("table_find_last", |b| {
        b.iter(|| {
            let record = table.find_by_id(black_box(last.as_str())).unwrap();
            black_box(record.payload_size());
        })
    });
}

fn benchmark_serialize(c: &mut Criterion) {
    let table = filled_table();

    c.bench_function("spdf_serialize", |b| {
        b.iter(|| {
            let _bytes = writer::to_vec(black_box(&table)).unwrap();
        })
    });
}

fn benchmark_deserialize(c: &mut Criterion) {
    let data = writer::to_vec(&filled_table()).unwrap();

    c.bench_function("spdf_deserialize", |b| {
        b.iter(|| {
            let _table = reader::from_slice(black_box(&data)).unwrap();
        })
    });
}

fn benchmark_file_round_trip(c: &mut Criterion) {
    let table = filled_table();
    let temp_file = NamedTempFile::new().unwrap();

    c.bench_function("spdf_file_round_trip", |b| {
        b.iter(|| {
            writer::save_to_file(&table, temp_file.path()).unwrap();
            let _table = reader::load_from_file(black_box(temp_file.path())).unwrap();
        })
    });
}

fn benchmark_encoded_size(c: &mut Criterion) {
    let table = filled_table();
    let stats = table.stats();
    println!("\n=== SPDF Size Breakdown ===");
    println!("Streams: {}", stats.data_streams);
    println!("Payload: {} bytes", stats.payload_bytes);
    println!("Encoded: {} bytes", stats.encoded_size);
    println!("Overhead: {:.4}%", stats.overhead_ratio() * 100.0);

    c.bench_function("spdf_stats", |b| {
        b.iter(|| black_box(table.stats()))
    });
}

criterion_group!(
    benches,
    benchmark_add,
    benchmark_remove,
    benchmark_find,
    benchmark_serialize,
    benchmark_deserialize,
    benchmark_file_round_trip,
    benchmark_encoded_size
);
criterion_main!(benches);
