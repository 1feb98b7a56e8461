//! Ping-pong throughput benchmark for swaprpc.
//!
//! A main and a worker thread exchange batches of `add` calls over channel
//! ports; the worker sums every batch and reports the total back. Run with:
//!
//! ```bash
//! cargo run --release -p swap_bench -- -r 10000 -c 256
//! ```

use std::thread;
use std::time::Instant;

use clap::Parser;

use swaprpc::{
    ArgKind, BufferExchange, Call, CodecBuilder, EndpointCodec, ExchangeConfig, ProcedureDef,
    ProcedureTable, Value,
};
use thread_port::channel;
use thread_port::ChannelPort;

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Parser, Debug, Clone)]
#[command(name = "swap_bench")]
#[command(about = "Ping-pong throughput benchmark for swaprpc")]
struct Args {
    /// Number of round trips
    #[arg(short, long, default_value = "10000")]
    rounds: u64,

    /// Calls encoded per batch
    #[arg(short, long, default_value = "256")]
    calls_per_batch: usize,

    /// Buffers per exchange side
    #[arg(short, long, default_value = "2")]
    buffers: usize,

    /// Channel capacity in 32-bit cells
    #[arg(long, default_value = "32768")]
    channel_size: usize,
}

// =============================================================================
// Procedure table
// =============================================================================

fn table() -> ProcedureTable {
    ProcedureTable::new(vec![
        ProcedureDef::new("add", &[ArgKind::Int, ArgKind::Int]).endpoint("worker"),
        ProcedureDef::new("sum", &[ArgKind::Int]).endpoint("main"),
    ])
    .expect("invalid procedure table")
}

// =============================================================================
// Worker side
// =============================================================================

fn worker_loop(port: ChannelPort, args: &Args) -> i64 {
    let table = table();
    let codec = CodecBuilder::new(&table, "worker")
        .channel_size(args.channel_size)
        .build()
        .expect("worker codec");
    let exchange = BufferExchange::new(port, &exchange_config(&codec, args)).expect("worker exchange");

    let mut grand_total = 0i64;
    let mut handled = 0u64;
    while handled < args.rounds {
        let mut received = Vec::new();
        exchange
            .poll(|buffer, _source| received.push(buffer))
            .expect("worker poll");
        if received.is_empty() {
            std::hint::spin_loop();
            continue;
        }
        for buffer in received {
            let mut batch_total = 0i64;
            {
                let mut region = buffer.region_mut().expect("worker region");
                let mut on_call = |call: Call<'_>| -> swaprpc::Result<()> {
                    batch_total += (call.int(0)? + call.int(1)?) as i64;
                    Ok(())
                };
                codec.read_batch(&mut region, &mut on_call).expect("worker decode");
            }
            buffer.release().expect("worker release");
            grand_total += batch_total;

            reply(&exchange, &codec, batch_total as i32);
            handled += 1;
        }
    }
    grand_total
}

fn reply(exchange: &BufferExchange<ChannelPort>, codec: &EndpointCodec, total: i32) {
    let buffer = exchange.get_write_buffer().expect("worker write buffer");
    {
        let mut region = buffer.region_mut().expect("reply region");
        let mut batch = codec.begin_write(&mut region).expect("reply batch");
        batch
            .call("sum", &[Value::Int(total)])
            .expect("encode sum");
    }
    buffer.release().expect("reply release");
}

// =============================================================================
// Main side
// =============================================================================

fn exchange_config(codec: &EndpointCodec, args: &Args) -> ExchangeConfig {
    ExchangeConfig {
        buffer_size: codec.required_buffer_size(),
        buffer_count: args.buffers,
        instance_id: None,
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    log::info!("starting ping-pong: {:?}", args);

    let (port_main, port_worker) = channel::pair(4 * args.buffers.max(1));

    let worker = {
        let worker_args = args.clone();
        thread::spawn(move || worker_loop(port_worker, &worker_args))
    };

    let table = table();
    let codec = CodecBuilder::new(&table, "main")
        .channel_size(args.channel_size)
        .build()
        .expect("main codec");
    let exchange = BufferExchange::new(port_main, &exchange_config(&codec, &args)).expect("main exchange");

    let start = Instant::now();
    let mut sent = 0u64;
    let mut acked = 0u64;
    let mut echoed_total = 0i64;

    while acked < args.rounds {
        if sent < args.rounds {
            if let Some(buffer) = exchange.get_write_buffer() {
                {
                    let mut region = buffer.region_mut().expect("main region");
                    let mut batch = codec.begin_write(&mut region).expect("main batch");
                    for i in 0..args.calls_per_batch {
                        batch
                            .call("add", &[Value::Int(i as i32), Value::Int(1)])
                            .expect("encode add");
                    }
                }
                buffer.release().expect("main release");
                sent += 1;
            }
        }

        let mut received = Vec::new();
        exchange
            .poll(|buffer, _source| received.push(buffer))
            .expect("main poll");
        for buffer in received {
            {
                let mut region = buffer.region_mut().expect("ack region");
                let mut on_call = |call: Call<'_>| -> swaprpc::Result<()> {
                    echoed_total += call.int(0)? as i64;
                    Ok(())
                };
                codec.read_batch(&mut region, &mut on_call).expect("main decode");
            }
            buffer.release().expect("ack release");
            acked += 1;
        }
    }

    let elapsed = start.elapsed();
    let worker_total = worker.join().expect("worker thread");

    let calls = args.rounds * args.calls_per_batch as u64;
    let per_batch: i64 = (0..args.calls_per_batch as i64).map(|i| i + 1).sum();
    let expected = per_batch * args.rounds as i64;
    assert_eq!(worker_total, expected, "worker sum mismatch");
    assert_eq!(echoed_total, expected, "echoed sum mismatch");

    println!(
        "{} rounds x {} calls in {:.3}s: {:.0} calls/s, {:.0} batches/s",
        args.rounds,
        args.calls_per_batch,
        elapsed.as_secs_f64(),
        calls as f64 / elapsed.as_secs_f64(),
        args.rounds as f64 / elapsed.as_secs_f64(),
    );
}
