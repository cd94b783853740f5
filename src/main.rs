use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use io_latency::telemetry::{REPORT_INTERVAL, REPORT_LAG_SECS};
use io_latency::{Telemetry, TelemetryOptions};
use tracing_subscriber::EnvFilter;

mod load_generator;

/// Number of simulated storage threads
const CONCURRENCY: u32 = 8;

/// How long the synthetic workload runs
const RUN_FOR: Duration = Duration::from_secs(10);

/// Percentage of operations that are reads (0–100)
const READ_PCT: u8 = 60;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("io_latency=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  STORAGE I/O LATENCY OBSERVATORY            ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Build the telemetry context ──────────────────────────
    let options = TelemetryOptions::default();
    let log_path = options.log_path.clone();
    let telemetry = Telemetry::new(options);

    // ── 2. Register call paths ──────────────────────────────────
    let paths = load_generator::CallPaths::register(&telemetry);
    println!("📌 Registered call paths: {paths:?}");

    // ── 3. Drive the synthetic workload ─────────────────────────
    // The reporter starts itself on the first completed measurement.
    println!(
        "🚀 Running {CONCURRENCY} workers × {}s, {READ_PCT}% reads / {}% appends",
        RUN_FOR.as_secs(),
        100 - READ_PCT
    );
    let running = Arc::new(AtomicBool::new(true));
    let load = {
        let telemetry = telemetry.clone();
        tokio::task::spawn_blocking(move || {
            load_generator::run(running, telemetry, paths, CONCURRENCY, RUN_FOR, READ_PCT)
        })
    };
    if let Err(e) = load.await {
        eprintln!("❌ Load generator failed: {e}");
        std::process::exit(1);
    }

    // ── 4. Let the lagging per-second report catch up ───────────
    let lag = Duration::from_secs(REPORT_LAG_SECS as u64) + REPORT_INTERVAL * 2;
    tokio::time::sleep(lag).await;

    println!();
    println!("Reports appended to {}", log_path.display());
    let (count, ids) = telemetry.tracked_threads();
    println!("Threads seen flushing: {count} {ids:?}");
}
