use std::fmt::Write as _;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::histogram::PayloadBucket;
use super::recorder::{EpochSnapshot, TargetDelta};
use super::stat::{SecondStat, RETENTION_SECS};
use super::REGISTRY_CAPACITY;
use crate::error::{Result, TelemetryError};
use crate::telemetry::Shared;

/// Background task that drains the recorder and prints per-second stats.
///
/// One per telemetry instance. In production it runs on its own thread for
/// the life of the process and is never joined.
pub struct Reporter {
    shared: Arc<Shared>,
    /// Counter values at the previous drain, indexed by target handle
    prev: Vec<EpochSnapshot>,
    /// Next per-second stat to print; `None` until the first report
    next_second: Option<i64>,
    epoch: u64,
}

/// Owner's side of a spawned reporter thread.
pub struct ReporterHandle {
    shared: Arc<Shared>,
    thread: JoinHandle<()>,
}

impl std::fmt::Debug for ReporterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReporterHandle").finish_non_exhaustive()
    }
}

impl ReporterHandle {
    /// Signal the reporter and wait for it to exit (at most one interval).
    pub fn stop(self) {
        self.shared.stop.store(true, Ordering::Release);
        if self.thread.join().is_err() {
            warn!("latency reporter thread panicked");
        }
    }

    /// Let the reporter run for the rest of the process.
    pub fn detach(self) {}
}

impl Reporter {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            prev: vec![EpochSnapshot::default(); REGISTRY_CAPACITY],
            next_second: None,
            epoch: 0,
        }
    }

    /// Spawn the reporter on a dedicated thread with its own single-threaded
    /// runtime, so call sites need not run inside tokio.
    pub(crate) fn spawn(shared: Arc<Shared>) -> Result<ReporterHandle> {
        let reporter = Reporter::new(shared.clone());
        let thread = std::thread::Builder::new()
            .name("io-latency-reporter".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        warn!(error = %e, "cannot build reporter runtime, latency reporting disabled");
                        return;
                    }
                };
                rt.block_on(reporter.run());
            })
            .map_err(TelemetryError::Io)?;

        Ok(ReporterHandle { shared, thread })
    }

    /// Open the log, then report once per interval until the stop flag is set.
    pub async fn run(mut self) {
        let path = self.shared.options.log_path.clone();
        match self.shared.sink.open(&path) {
            Ok(()) => info!(path = %path.display(), "latency log opened"),
            Err(TelemetryError::SinkAlreadyOpen) => debug!("latency log already open"),
            Err(e) => warn!(path = %path.display(), error = %e, "cannot open latency log"),
        }

        let period = self.shared.options.report_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(ticker);

        while ticks.next().await.is_some() {
            if self.shared.stop.load(Ordering::Acquire) {
                break;
            }
            self.tick();
        }
        info!(epochs = self.epoch, "latency reporter stopped");
    }

    /// Build one report and append it to the log.
    pub fn tick(&mut self) {
        let report = self.report(Local::now());
        if let Err(e) = self.shared.sink.write_report(&report) {
            warn!(error = %e, "failed to write latency report");
        }
    }

    /// Drain everything accumulated since the previous call and format it.
    pub fn report(&mut self, now: DateTime<Local>) -> String {
        self.epoch += 1;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== latency report #{} at {} ===",
            self.epoch,
            now.format("%Y-%m-%d %H:%M:%S")
        );

        self.write_targets(&mut out);
        self.write_stats(&mut out, now.timestamp() - self.shared.options.report_lag_secs);
        write_payload(&mut out, &self.shared.payload.drain());

        let (count, ids) = self.shared.threads.snapshot();
        let _ = writeln!(out, "threads ({count}): {ids:?}");
        out
    }

    fn write_targets(&mut self, out: &mut String) {
        for (handle, name, target) in self.shared.targets.iter() {
            let Some(prev) = self.prev.get_mut(handle.index()) else {
                continue;
            };
            let delta = target.drain(prev);
            if delta.count == 0 {
                continue;
            }
            write_target(out, name, &delta);
        }
    }

    /// Print every second up to `upto` that has not been printed yet.
    fn write_stats(&mut self, out: &mut String, upto: i64) {
        let from = self
            .next_second
            .unwrap_or(upto)
            .max(upto - RETENTION_SECS);

        for second in from..=upto {
            for (_, name, item) in self.shared.stats.iter() {
                let Some(stat) = item.second_stat(second).filter(|s| s.total_reqs() > 0) else {
                    continue;
                };
                let parent_latency = item
                    .parent()
                    .and_then(|p| self.shared.stats.get(p))
                    .map_or(0, |p| p.latency_at(second));
                write_stat(out, name, &stat, parent_latency);
            }
        }
        self.next_second = Some(self.next_second.unwrap_or(upto).max(upto + 1));
    }
}

/// Share of the parent's latency spent in the child, in whole percent.
/// 0 when there is no parent data for the second.
pub fn percent_of_parent(child_latency_us: u64, parent_latency_us: u64) -> u64 {
    if parent_latency_us == 0 {
        return 0;
    }
    child_latency_us.saturating_mul(100) / parent_latency_us
}

fn write_target(out: &mut String, name: &str, d: &TargetDelta) {
    let _ = writeln!(out, "{name}");
    let _ = writeln!(
        out,
        "  max: {} us, avg: {} us, count: {}, total: {} us",
        d.max_us,
        d.average_us(),
        d.count,
        d.latency_us
    );
    for (bucket, n) in &d.buckets {
        let _ = writeln!(out, "  {:<14}{n}", bucket.to_string());
    }
}

fn write_stat(out: &mut String, name: &str, stat: &SecondStat, parent_latency_us: u64) {
    let p = stat.percentiles();
    let _ = writeln!(
        out,
        "Name: {name}  time: {}, requests: {}, total latency: {} us, percent: {} %, \
         average latency: {} us, min/p50/p75/p95/p99 latency: {}/{}/{}/{}/{} us",
        stat.second(),
        stat.total_reqs(),
        stat.total_latency_us(),
        percent_of_parent(stat.total_latency_us(), parent_latency_us),
        p.average,
        p.min,
        p.p50,
        p.p75,
        p.p95,
        p.p99,
    );
}

fn write_payload(out: &mut String, buckets: &[(PayloadBucket, u64)]) {
    let _ = writeln!(out, "payload sizes:");
    for (bucket, n) in buckets {
        let _ = writeln!(out, "  {:<20}{n}", bucket.to_string());
    }
}
