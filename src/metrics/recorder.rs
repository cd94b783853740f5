use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::histogram::{Bucket, LatencyHistogram};
use super::Handle;

/// Aggregate counters and latency histogram for one registered target.
///
/// Every field is an independent atomic, so concurrent `record` calls never
/// contend on a lock. `count` and `latency_us` only ever grow; the reporter
/// turns them into per-epoch deltas with [`EpochSnapshot`]. `max_us` and the
/// histogram cells are drained by swapping them to zero.
pub struct Target {
    count: AtomicU64,
    latency_us: AtomicU64,
    max_us: AtomicU64,
    histogram: LatencyHistogram,
}

/// Start-of-call marker returned by `begin`. Plain data, no allocation.
#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub(crate) handle: Handle,
    pub(crate) start: Instant,
}

impl Token {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            start: Instant::now(),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Elapsed time up to `now`; a `now` earlier than the start clamps to zero.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }
}

/// Counter values seen at the previous drain.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochSnapshot {
    count: u64,
    latency_us: u64,
}

/// What happened on one target during one reporting epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDelta {
    pub count: u64,
    pub latency_us: u64,
    pub max_us: u64,
    pub buckets: Vec<(Bucket, u64)>,
}

impl TargetDelta {
    pub fn average_us(&self) -> u64 {
        self.latency_us / self.count.max(1)
    }
}

impl Target {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            latency_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
            histogram: LatencyHistogram::new(),
        }
    }

    /// Hot path. Wait-free: three fetch ops and one bucket increment.
    #[inline]
    pub fn record(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        self.count.fetch_add(1, Ordering::Relaxed);
        self.latency_us.fetch_add(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
        self.histogram.record(us);
    }

    pub fn total_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn total_latency_us(&self) -> u64 {
        self.latency_us.load(Ordering::Relaxed)
    }

    /// Read-and-reset this target for one epoch.
    ///
    /// Count and latency are computed as deltas against `prev`, which is then
    /// advanced; a write racing with the drain is attributed to exactly one of
    /// the two adjacent epochs.
    pub fn drain(&self, prev: &mut EpochSnapshot) -> TargetDelta {
        let count = self.count.load(Ordering::Acquire);
        let latency_us = self.latency_us.load(Ordering::Acquire);
        let max_us = self.max_us.swap(0, Ordering::AcqRel);
        let buckets = self.histogram.drain();

        let delta = TargetDelta {
            count: count.wrapping_sub(prev.count),
            latency_us: latency_us.wrapping_sub(prev.latency_us),
            max_us,
            buckets,
        };
        *prev = EpochSnapshot { count, latency_us };
        delta
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new()
    }
}
