use std::sync::Once;
use std::time::Duration;

use chrono::{Local, TimeZone};
use io_latency::metrics::Bucket;
use io_latency::{Handle, Telemetry, TelemetryError, TelemetryOptions};
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("io_latency=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

fn isolated() -> Telemetry {
    init_tracing();
    Telemetry::new(TelemetryOptions {
        auto_start: false,
        ..TelemetryOptions::default()
    })
}

#[test]
fn fast_calls_and_one_slow_call() {
    let t = isolated();
    let a = t.register_target("ZoneFileAppend").unwrap();
    for _ in 0..100 {
        t.record(a, Duration::from_micros(50));
    }
    t.record(a, Duration::from_micros(150_000));

    let out = t.reporter().report(Local.timestamp_opt(1_700_000_000, 0).unwrap());

    assert!(out.contains("ZoneFileAppend\n"), "{out}");
    assert!(out.contains("  max: 150000 us, avg: 1534 us, count: 101, total: 155000 us\n"), "{out}");
    assert!(out.contains(&format!("  {:<14}100\n", "48-64 us")), "{out}");
    assert!(out.contains(&format!("  {:<14}1\n", ">100 ms")), "{out}");
    assert_eq!(t.target(a).unwrap().total_count(), 101);
}

#[test]
fn registry_limits() {
    let t = isolated();
    assert!(matches!(t.register_target(""), Err(TelemetryError::EmptyName)));
    assert!(matches!(t.alloc_stat(""), Err(TelemetryError::EmptyName)));

    for i in 0..1024 {
        t.register_target(&format!("target-{i}")).unwrap();
    }
    assert!(matches!(
        t.register_target("target-1024"),
        Err(TelemetryError::RegistryFull { capacity: 1024 })
    ));
    assert!(matches!(t.target(Handle::from_raw(-1)), Err(TelemetryError::NotFound(_))));
    assert!(matches!(t.target(Handle::from_raw(5_000)), Err(TelemetryError::NotFound(_))));
}

#[test]
fn concurrent_recording_across_two_epochs() {
    const THREADS: u64 = 6;
    const PER_THREAD: u64 = 10_000;

    let t = isolated();
    let h = t.register_target("pwrite").unwrap();
    let mut reporter = t.reporter();
    let mut reports = Vec::new();

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for i in 0..PER_THREAD {
                    t.record(h, Duration::from_micros(i % 3_000));
                }
            });
        }
        reports.push(reporter.report(Local::now()));
    });
    reports.push(reporter.report(Local::now()));

    let counted: u64 = reports
        .iter()
        .flat_map(|r| r.lines())
        .filter_map(|l| l.split("count: ").nth(1))
        .map(|rest| rest.split(',').next().unwrap().parse::<u64>().unwrap())
        .sum();
    assert_eq!(counted, THREADS * PER_THREAD);
}

#[test]
fn per_second_stats_through_the_public_api() {
    let t = isolated();
    let parent = t.alloc_stat("ZoneFileAppend").unwrap();
    let child = t.alloc_child_stat("BufferedAppend", parent).unwrap();

    for (us, n) in [(10, 1), (20, 1), (30, 1), (40, 1)] {
        for _ in 0..n {
            t.add_measurement(parent, 500, us);
        }
    }
    t.add_measurement(child, 500, 60);

    let p = t.second_stat(parent, 500).unwrap().percentiles();
    assert_eq!((p.min, p.p50, p.average), (10, 20, 25));

    // Retention: once 503 is seen, 500 is gone for good.
    for s in [501, 502, 503] {
        t.add_measurement(parent, s, 1);
    }
    assert!(t.second_stat(parent, 500).is_none());
    assert!(t.second_stat(parent, 501).is_some());
    // The child saw nothing newer, so it still holds 500.
    assert!(t.second_stat(child, 500).is_some());
}

#[test]
fn histogram_buckets_sum_to_count() {
    let t = isolated();
    let h = t.register_target("pread").unwrap();
    let samples = [0, 15, 16, 999, 1_000, 42_000, 99_999, 100_000, 2_000_000];
    for us in samples {
        t.record(h, Duration::from_micros(us));
    }

    let target = t.target(h).unwrap();
    assert_eq!(target.total_count(), samples.len() as u64);
    assert_eq!(target.total_latency_us(), samples.iter().sum::<u64>());

    let delta = target.drain(&mut Default::default());
    assert_eq!(delta.buckets.iter().map(|(_, n)| n).sum::<u64>(), delta.count);
    assert_eq!(delta.max_us, 2_000_000);
    assert!(delta.buckets.contains(&(Bucket::Overflow, 2)));
    assert!(delta.buckets.contains(&(Bucket::Coarse(99), 1)));
}
