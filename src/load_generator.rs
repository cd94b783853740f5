use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use io_latency::{Handle, Telemetry};

/// Handles for every instrumented call path in the simulated engine.
#[derive(Debug, Clone, Copy)]
pub struct CallPaths {
    pub zone_file_append: Handle,
    pub buffered_append: Handle,
    pub pread: Handle,
    pub pwrite: Handle,
    /// Per-second stats: append is the parent of the buffered step
    pub append_stat: Handle,
    pub buffered_stat: Handle,
    pub read_stat: Handle,
}

impl CallPaths {
    /// Register every call path. A failed registration just disables that point.
    pub fn register(telemetry: &Telemetry) -> Self {
        let target = |name: &str| telemetry.register_target(name).unwrap_or(Handle::INVALID);
        let append_stat = telemetry.alloc_stat("ZoneFileAppend").unwrap_or(Handle::INVALID);

        Self {
            zone_file_append: target("ZoneFileAppend"),
            buffered_append: target("BufferedAppend"),
            pread: target("pread"),
            pwrite: target("pwrite"),
            append_stat,
            buffered_stat: telemetry
                .alloc_child_stat("BufferedAppend", append_stat)
                .unwrap_or(Handle::INVALID),
            read_stat: telemetry.alloc_stat("PositionedRead").unwrap_or(Handle::INVALID),
        }
    }
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `concurrency` worker threads that issue simulated storage calls
/// until the deadline or the `running` flag is cleared.
pub fn run(
    running: Arc<AtomicBool>,
    telemetry: Telemetry,
    paths: CallPaths,
    concurrency: u32,
    duration: Duration,
    read_pct: u8,
) {
    let deadline = Instant::now() + duration;

    std::thread::scope(|s| {
        for worker_id in 0..concurrency {
            let running = &running;
            let telemetry = &telemetry;
            s.spawn(move || worker(worker_id, running, telemetry, paths, deadline, read_pct));
        }
    });

    running.store(false, Ordering::SeqCst);
}

// ─── Worker loop ─────────────────────────────────────────────────

fn worker(
    id: u32,
    running: &AtomicBool,
    telemetry: &Telemetry,
    paths: CallPaths,
    deadline: Instant,
    read_pct: u8,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        if rng.gen_range(0u8..100) < read_pct {
            do_read(&mut rng, telemetry, &paths);
        } else {
            do_append(&mut rng, telemetry, &paths);
        }
    }
}

/// Simulated device latency: mostly fast, with a slow tail.
fn device_delay(rng: &mut StdRng) -> Duration {
    let us = match rng.gen_range(0u32..1000) {
        0 => rng.gen_range(100_000..150_000),
        1..=20 => rng.gen_range(1_000..20_000),
        _ => rng.gen_range(20..600),
    };
    Duration::from_micros(us)
}

// ─── Read operation ──────────────────────────────────────────────

fn do_read(rng: &mut StdRng, telemetry: &Telemetry, paths: &CallPaths) {
    let _stat = telemetry.measure(paths.read_stat);
    let delay = device_delay(rng);
    telemetry.time(paths.pread, || std::thread::sleep(delay));
}

// ─── Append operation ────────────────────────────────────────────

fn do_append(rng: &mut StdRng, telemetry: &Telemetry, paths: &CallPaths) {
    let _stat = telemetry.measure(paths.append_stat);
    let append = telemetry.begin(paths.zone_file_append);

    let size = match rng.gen_range(0u8..10) {
        0 => rng.gen_range(1024 * 1024..4 * 1024 * 1024),
        _ => rng.gen_range(512..256 * 1024),
    };
    telemetry.record_payload(size);

    {
        let _buffered = telemetry.measure(paths.buffered_stat);
        telemetry.time(paths.buffered_append, || {
            std::thread::sleep(Duration::from_micros(rng.gen_range(5..80)))
        });
    }

    // Only the flush path is tracked per thread.
    if size >= 64 * 1024 {
        telemetry.track_current_thread();
        let delay = device_delay(rng);
        telemetry.time(paths.pwrite, || std::thread::sleep(delay));
    }

    telemetry.end(append);
}
