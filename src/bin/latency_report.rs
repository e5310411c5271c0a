//! Round-trip latency report for the ring.
//!
//! Two rings form a ping-pong between an origin thread and an echo
//! thread: origin pushes a token, echo pops it and pushes it straight
//! back, origin measures the round trip. One message is in flight at a
//! time, so the numbers are pure hand-off cost with no queueing noise.

use std::hint;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use clap::Parser;
use hdrhistogram::Histogram;
use serde::Serialize;

use flash_ring::{Consumer, Producer, SpscQueue};

#[derive(Parser, Debug)]
#[command(name = "latency-report")]
#[command(about = "Measure SPSC ring round-trip latency core to core")]
struct Args {
    /// Ring capacity in slots; must be a power of two
    #[arg(long, default_value_t = 1024)]
    capacity: usize,

    /// Round trips to measure
    #[arg(long, default_value_t = 1_000_000)]
    messages: usize,

    /// Unrecorded round trips before measurement starts
    #[arg(long, default_value_t = 100_000)]
    warmup: usize,

    /// Pin the origin thread to this core index
    #[arg(long)]
    origin_core: Option<usize>,

    /// Pin the echo thread to this core index
    #[arg(long)]
    echo_core: Option<usize>,

    /// Write percentile rows to this CSV file
    #[arg(long)]
    csv: Option<PathBuf>,
}

/// One percentile row for CSV export.
#[derive(Serialize)]
struct PercentileRow {
    timestamp: DateTime<Utc>,
    quantile: &'static str,
    nanos: u64,
}

/// Pin the current thread to a specific core index, if it exists.
fn pin_to_core(index: usize) {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(core) = core_ids.get(index) {
            core_affinity::set_for_current(*core);
        }
    }
}

/// Send one token and spin until it comes back.
#[inline]
fn round_trip(tx: &mut Producer<u64>, rx: &mut Consumer<u64>, token: u64) -> u64 {
    while tx.push(token).is_err() {
        hint::spin_loop();
    }
    loop {
        if let Some(value) = rx.pop() {
            return value;
        }
        hint::spin_loop();
    }
}

fn main() {
    let args = Args::parse();

    if !args.capacity.is_power_of_two() {
        eprintln!("--capacity must be a power of two, got {}", args.capacity);
        std::process::exit(2);
    }

    println!("Preparing Latency Benchmark...");
    println!(
        "capacity={} messages={} warmup={}",
        args.capacity, args.messages, args.warmup
    );

    // Origin -> echo on one ring, echo -> origin on the other.
    let (mut origin_tx, mut echo_rx) = SpscQueue::<u64>::with_capacity(args.capacity);
    let (mut echo_tx, mut origin_rx) = SpscQueue::<u64>::with_capacity(args.capacity);

    let total = args.warmup + args.messages;
    let echo_core = args.echo_core;

    let echo = thread::Builder::new()
        .name("echo".to_string())
        .spawn(move || {
            if let Some(core) = echo_core {
                pin_to_core(core);
            }
            for _ in 0..total {
                let mut value = loop {
                    if let Some(v) = echo_rx.pop() {
                        break v;
                    }
                    hint::spin_loop();
                };
                while let Err(full) = echo_tx.push(value) {
                    value = full.0;
                    hint::spin_loop();
                }
            }
        })
        .expect("spawn echo thread");

    if let Some(core) = args.origin_core {
        pin_to_core(core);
    }

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 10_000_000, 3).unwrap();

    for i in 0..args.warmup {
        let echoed = round_trip(&mut origin_tx, &mut origin_rx, i as u64);
        assert_eq!(echoed, i as u64, "echo out of order");
    }

    println!("Running {} round trips...", args.messages);

    let started = Instant::now();
    for i in 0..args.messages {
        let token = (args.warmup + i) as u64;

        // Critical measurement section
        let t0 = Instant::now();
        let echoed = hint::black_box(round_trip(&mut origin_tx, &mut origin_rx, token));
        let elapsed = t0.elapsed();

        assert_eq!(echoed, token, "echo out of order");
        // Outliers beyond the 10ms bound are dropped rather than panicking
        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
    }
    let total_duration = started.elapsed();

    echo.join().expect("echo thread panicked");

    println!("\n=== Round-Trip Latency Report (ns) ===");
    println!("Total Trips: {}", args.messages);
    println!(
        "Throughput:  {:.2} round trips/sec",
        args.messages as f64 / total_duration.as_secs_f64()
    );
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");

    // Quick ASCII histogram
    println!("\nDistribution:");
    let mut lower = 0u64;
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!(
                "{:7} ns - {:7} ns: {:10} count",
                lower,
                v.value_iterated_to(),
                count
            );
        }
        lower = v.value_iterated_to() + 1;
    }

    if let Some(path) = args.csv.as_ref() {
        let now = Utc::now();
        let mut writer = csv::Writer::from_path(path).expect("open csv output");
        let rows = [
            ("min", histogram.min()),
            ("p50", histogram.value_at_quantile(0.50)),
            ("p90", histogram.value_at_quantile(0.90)),
            ("p99", histogram.value_at_quantile(0.99)),
            ("p99.9", histogram.value_at_quantile(0.999)),
            ("p99.99", histogram.value_at_quantile(0.9999)),
            ("max", histogram.max()),
        ];
        for (quantile, nanos) in rows {
            writer
                .serialize(PercentileRow {
                    timestamp: now,
                    quantile,
                    nanos,
                })
                .expect("write csv row");
        }
        writer.flush().expect("flush csv output");
        println!("\nWrote percentile rows to {}", path.display());
    }
}
