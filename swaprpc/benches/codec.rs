//! Batch codec encode/decode benchmarks.
//!
//! Run with:
//! ```bash
//! cargo bench --package swaprpc --bench codec
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use swaprpc::{ArgKind, Call, CodecBuilder, ProcedureDef, ProcedureTable, Value};

const CALLS_PER_BATCH: usize = 1024;

fn table() -> ProcedureTable {
    ProcedureTable::new(vec![
        ProcedureDef::new("add", &[ArgKind::Int, ArgKind::Int]).endpoint("worker"),
        ProcedureDef::new("label", &[ArgKind::Str, ArgKind::Float]).endpoint("worker"),
    ])
    .unwrap()
}

fn bench_encode_ints(c: &mut Criterion) {
    let table = table();
    let codec = CodecBuilder::new(&table, "main").build().unwrap();
    let mut region = vec![0u8; codec.required_buffer_size()];
    let args = [Value::Int(12), Value::Int(11)];

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(CALLS_PER_BATCH as u64));
    group.bench_function("int_batch", |b| {
        b.iter(|| {
            let mut batch = codec.begin_write(&mut region).unwrap();
            for _ in 0..CALLS_PER_BATCH {
                batch.call("add", black_box(&args)).unwrap();
            }
            black_box(batch.len())
        })
    });
    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let table = table();
    let main = CodecBuilder::new(&table, "main").build().unwrap();
    let worker = CodecBuilder::new(&table, "worker").build().unwrap();
    let mut region = vec![0u8; main.required_buffer_size()];

    let mut group = c.benchmark_group("roundtrip");
    group.throughput(Throughput::Elements(CALLS_PER_BATCH as u64));

    group.bench_function("int_batch", |b| {
        b.iter(|| {
            {
                let mut batch = main.begin_write(&mut region).unwrap();
                for i in 0..CALLS_PER_BATCH {
                    batch
                        .call("add", &[Value::Int(i as i32), Value::Int(1)])
                        .unwrap();
                }
            }
            let mut total = 0i64;
            let mut on_call = |call: Call<'_>| -> swaprpc::Result<()> {
                total += (call.int(0)? + call.int(1)?) as i64;
                Ok(())
            };
            worker.read_batch(&mut region, &mut on_call).unwrap();
            black_box(total)
        })
    });

    group.bench_function("str_batch", |b| {
        b.iter(|| {
            {
                let mut batch = main.begin_write(&mut region).unwrap();
                for _ in 0..CALLS_PER_BATCH / 4 {
                    batch
                        .call("label", &[Value::from("entity"), Value::Float(0.25)])
                        .unwrap();
                }
            }
            let mut chars = 0usize;
            let mut on_call = |call: Call<'_>| -> swaprpc::Result<()> {
                chars += call.str(0)?.len();
                Ok(())
            };
            worker.read_batch(&mut region, &mut on_call).unwrap();
            black_box(chars)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_encode_ints, bench_roundtrip);
criterion_main!(benches);
