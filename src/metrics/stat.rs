use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;

use super::percentiles::PercentileSet;
use super::Handle;

/// Seconds of history an item keeps behind the newest second it has seen.
pub const RETENTION_SECS: i64 = 2;

/// Every latency observed by one stat item during one wall-clock second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondStat {
    second: i64,
    total_reqs: u64,
    total_latency_us: u64,
    /// latency (μs) → number of calls that took exactly that long
    latencies: BTreeMap<u64, u64>,
}

impl SecondStat {
    pub fn new(second: i64) -> Self {
        Self {
            second,
            total_reqs: 0,
            total_latency_us: 0,
            latencies: BTreeMap::new(),
        }
    }

    pub fn second(&self) -> i64 {
        self.second
    }

    pub fn total_reqs(&self) -> u64 {
        self.total_reqs
    }

    pub fn total_latency_us(&self) -> u64 {
        self.total_latency_us
    }

    pub fn frequencies(&self) -> &BTreeMap<u64, u64> {
        &self.latencies
    }

    pub fn record(&mut self, us: u64) {
        self.total_reqs += 1;
        self.total_latency_us = self.total_latency_us.saturating_add(us);
        *self.latencies.entry(us).or_insert(0) += 1;
    }

    pub fn percentiles(&self) -> PercentileSet {
        PercentileSet::from_frequencies(&self.latencies, self.total_reqs, self.total_latency_us)
    }
}

/// A named measurement point with a short per-second history.
///
/// The history sits behind this item's own mutex, so writers to different
/// items never contend with each other.
pub struct StatItem {
    parent: Option<Handle>,
    seconds: Mutex<HashMap<i64, SecondStat>>,
}

impl StatItem {
    pub fn new(parent: Option<Handle>) -> Self {
        Self {
            parent,
            seconds: Mutex::new(HashMap::new()),
        }
    }

    pub fn parent(&self) -> Option<Handle> {
        self.parent
    }

    /// Add one observation for `second`.
    ///
    /// Creating the entry for a new second also evicts every entry more than
    /// [`RETENTION_SECS`] older than it. Eviction only happens here, so an item
    /// that stops receiving measurements keeps its last entries indefinitely.
    pub fn add_measurement(&self, second: i64, duration_us: u64) {
        let mut seconds = self.seconds.lock();
        if !seconds.contains_key(&second) {
            seconds.retain(|&s, _| second.saturating_sub(s) <= RETENTION_SECS);
        }
        seconds
            .entry(second)
            .or_insert_with(|| SecondStat::new(second))
            .record(duration_us);
    }

    /// Copy of the entry for `second`, if it is still retained.
    pub fn second_stat(&self, second: i64) -> Option<SecondStat> {
        self.seconds.lock().get(&second).cloned()
    }

    /// Total latency for `second`, or 0 when nothing is retained for it.
    pub fn latency_at(&self, second: i64) -> u64 {
        self.seconds
            .lock()
            .get(&second)
            .map_or(0, SecondStat::total_latency_us)
    }

    pub fn remove_second_stat(&self, second: i64) -> Option<SecondStat> {
        self.seconds.lock().remove(&second)
    }

    /// Seconds currently retained, ascending.
    pub fn retained_seconds(&self) -> Vec<i64> {
        let mut secs: Vec<_> = self.seconds.lock().keys().copied().collect();
        secs.sort_unstable();
        secs
    }
}

/// Scoped timer for a stat item: records the elapsed microseconds at the
/// current wall-clock second when dropped.
#[must_use = "the measurement is recorded when the guard is dropped"]
pub struct Measurement<'a> {
    item: Option<&'a StatItem>,
    start: Instant,
}

impl<'a> Measurement<'a> {
    pub(crate) fn new(item: Option<&'a StatItem>) -> Self {
        Self {
            item,
            start: Instant::now(),
        }
    }
}

impl Drop for Measurement<'_> {
    fn drop(&mut self) {
        if let Some(item) = self.item {
            let us = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);
            item.add_measurement(Utc::now().timestamp(), us);
        }
    }
}
