use std::array;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ─── Layout ──────────────────────────────────────────────────────

/// Width of a fine-grained latency bucket (μs)
pub const FINE_WIDTH_US: u64 = 16;
/// Fine buckets cover [0, FINE_LIMIT_US)
pub const FINE_LIMIT_US: u64 = 1_000;
/// Width of a coarse latency bucket (μs)
pub const COARSE_WIDTH_US: u64 = 1_000;
/// Coarse buckets cover [FINE_LIMIT_US, COARSE_LIMIT_US). Exactly 100 000 μs
/// already overflows; the overflow line still reads `>100 ms` in reports.
pub const COARSE_LIMIT_US: u64 = 100_000;

const FIRST_COARSE_MS: u64 = FINE_LIMIT_US / COARSE_WIDTH_US;
const COARSE_LIMIT_MS: u64 = COARSE_LIMIT_US / COARSE_WIDTH_US;

const FINE_CELLS: usize = FINE_LIMIT_US.div_ceil(FINE_WIDTH_US) as usize;
const COARSE_CELLS: usize = ((COARSE_LIMIT_US - FINE_LIMIT_US) / COARSE_WIDTH_US) as usize;
const LATENCY_CELLS: usize = FINE_CELLS + COARSE_CELLS + 1;

/// Width of a payload-size bucket (bytes)
pub const PAYLOAD_WIDTH: u64 = 4 * 1024;
/// Payloads at or above this size land in the overflow bucket, so exactly
/// 1 MiB overflows and is labelled `>=1048576 B`.
pub const PAYLOAD_LIMIT: u64 = 1024 * 1024;

const PAYLOAD_CELLS: usize = (PAYLOAD_LIMIT / PAYLOAD_WIDTH) as usize + 1;

// ─── Latency buckets ─────────────────────────────────────────────

/// One cell of a [`LatencyHistogram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// `[i * 16, (i + 1) * 16)` μs, capped at 1000 μs
    Fine(usize),
    /// `[ms, ms + 1)` milliseconds, 1 ≤ ms < 100
    Coarse(u64),
    /// 100 ms and above
    Overflow,
}

impl Bucket {
    /// Classify a latency. Exact multiples of a width start the next bucket:
    /// 16 μs is `Fine(1)`, 1000 μs is `Coarse(1)`, 100 000 μs is `Overflow`.
    pub fn for_latency(us: u64) -> Self {
        if us < FINE_LIMIT_US {
            Bucket::Fine((us / FINE_WIDTH_US) as usize)
        } else if us < COARSE_LIMIT_US {
            Bucket::Coarse(us / COARSE_WIDTH_US)
        } else {
            Bucket::Overflow
        }
    }

    /// Cell index, or `None` for a bucket outside the layout.
    fn cell(self) -> Option<usize> {
        match self {
            Bucket::Fine(i) if i < FINE_CELLS => Some(i),
            Bucket::Coarse(ms) if (FIRST_COARSE_MS..COARSE_LIMIT_MS).contains(&ms) => {
                Some(FINE_CELLS + (ms - FIRST_COARSE_MS) as usize)
            }
            Bucket::Overflow => Some(LATENCY_CELLS - 1),
            _ => None,
        }
    }

    fn from_cell(cell: usize) -> Self {
        if cell < FINE_CELLS {
            Bucket::Fine(cell)
        } else if cell < FINE_CELLS + COARSE_CELLS {
            Bucket::Coarse((cell - FINE_CELLS) as u64 + FIRST_COARSE_MS)
        } else {
            Bucket::Overflow
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Bucket::Fine(i) => {
                let lo = i as u64 * FINE_WIDTH_US;
                let hi = (lo + FINE_WIDTH_US).min(FINE_LIMIT_US);
                write!(f, "{lo}-{hi} us")
            }
            Bucket::Coarse(ms) => write!(f, "{ms} ms"),
            Bucket::Overflow => write!(f, ">{} ms", COARSE_LIMIT_US / 1_000),
        }
    }
}

/// Lock-free latency histogram: one atomic counter per bucket.
///
/// Writers `fetch_add` into exactly one cell; the reporter swaps every
/// cell to zero, so a concurrent increment lands in either this drain or
/// the next one, never both.
pub struct LatencyHistogram {
    cells: [AtomicU64; LATENCY_CELLS],
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            cells: array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    #[inline]
    pub fn record(&self, us: u64) {
        if let Some(cell) = Bucket::for_latency(us).cell().and_then(|i| self.cells.get(i)) {
            cell.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current value of one bucket without resetting it; 0 for a bucket
    /// outside the layout.
    pub fn count(&self, bucket: Bucket) -> u64 {
        bucket
            .cell()
            .and_then(|i| self.cells.get(i))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Read-and-reset every cell, returning the nonzero ones in ascending order.
    pub fn drain(&self) -> Vec<(Bucket, u64)> {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| {
                let n = cell.swap(0, Ordering::AcqRel);
                (n > 0).then(|| (Bucket::from_cell(i), n))
            })
            .collect()
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Payload sizes ───────────────────────────────────────────────

/// One cell of a [`PayloadSizeHistogram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadBucket {
    /// `[i * 4 KiB, (i + 1) * 4 KiB)`
    Sized(usize),
    /// 1 MiB and above
    Overflow,
}

impl PayloadBucket {
    pub fn for_size(bytes: u64) -> Self {
        if bytes < PAYLOAD_LIMIT {
            PayloadBucket::Sized((bytes / PAYLOAD_WIDTH) as usize)
        } else {
            PayloadBucket::Overflow
        }
    }

    fn cell(self) -> Option<usize> {
        match self {
            PayloadBucket::Sized(i) if i < PAYLOAD_CELLS - 1 => Some(i),
            PayloadBucket::Overflow => Some(PAYLOAD_CELLS - 1),
            PayloadBucket::Sized(_) => None,
        }
    }
}

impl fmt::Display for PayloadBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PayloadBucket::Sized(i) => {
                let lo = i as u64 * PAYLOAD_WIDTH;
                write!(f, "{}-{} B", lo, lo + PAYLOAD_WIDTH)
            }
            PayloadBucket::Overflow => write!(f, ">={PAYLOAD_LIMIT} B"),
        }
    }
}

/// Distribution of write sizes, drained alongside the latency histograms.
pub struct PayloadSizeHistogram {
    cells: [AtomicU64; PAYLOAD_CELLS],
}

impl PayloadSizeHistogram {
    pub fn new() -> Self {
        Self {
            cells: array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    #[inline]
    pub fn record(&self, bytes: u64) {
        if let Some(cell) = PayloadBucket::for_size(bytes).cell().and_then(|i| self.cells.get(i)) {
            cell.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn drain(&self) -> Vec<(PayloadBucket, u64)> {
        let last = PAYLOAD_CELLS - 1;
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| {
                let n = cell.swap(0, Ordering::AcqRel);
                let bucket = if i == last {
                    PayloadBucket::Overflow
                } else {
                    PayloadBucket::Sized(i)
                };
                (n > 0).then_some((bucket, n))
            })
            .collect()
    }
}

impl Default for PayloadSizeHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn layout_matches_bucket_widths() {
        assert_eq!(FINE_CELLS, 63);
        assert_eq!(COARSE_CELLS, 99);
        assert_eq!(Bucket::Coarse(99).cell().map(Bucket::from_cell), Some(Bucket::Coarse(99)));
        assert_eq!(Bucket::Fine(62).cell().map(Bucket::from_cell), Some(Bucket::Fine(62)));
    }

    // Exact multiples of a width always open the next bucket.
    #[test]
    fn boundary_values_open_the_next_bucket() {
        assert_eq!(Bucket::for_latency(0), Bucket::Fine(0));
        assert_eq!(Bucket::for_latency(15), Bucket::Fine(0));
        assert_eq!(Bucket::for_latency(16), Bucket::Fine(1));
        assert_eq!(Bucket::for_latency(999), Bucket::Fine(62));
        assert_eq!(Bucket::for_latency(1_000), Bucket::Coarse(1));
        assert_eq!(Bucket::for_latency(1_999), Bucket::Coarse(1));
        assert_eq!(Bucket::for_latency(2_000), Bucket::Coarse(2));
        assert_eq!(Bucket::for_latency(99_999), Bucket::Coarse(99));
        assert_eq!(Bucket::for_latency(100_000), Bucket::Overflow);
    }

    #[test]
    fn payload_limit_itself_overflows() {
        assert_eq!(PayloadBucket::for_size(PAYLOAD_LIMIT - 1), PayloadBucket::Sized(255));
        assert_eq!(PayloadBucket::for_size(PAYLOAD_LIMIT), PayloadBucket::Overflow);
    }

    #[test]
    fn out_of_layout_buckets_count_zero() {
        let h = LatencyHistogram::new();
        // Land in cells that a naive index for Fine(99) or Coarse(0) would hit.
        h.record(37_500);
        h.record(1_200);
        assert_eq!(h.count(Bucket::Coarse(37)), 1);
        assert_eq!(h.count(Bucket::Coarse(1)), 1);

        for bogus in [Bucket::Fine(63), Bucket::Fine(99), Bucket::Coarse(0), Bucket::Coarse(100)] {
            assert_eq!(bogus.cell(), None);
            assert_eq!(h.count(bogus), 0);
        }
        assert_eq!(PayloadBucket::Sized(256).cell(), None);
    }

    #[test]
    fn labels() {
        assert_eq!(Bucket::for_latency(50).to_string(), "48-64 us");
        assert_eq!(Bucket::Fine(62).to_string(), "992-1000 us");
        assert_eq!(Bucket::Coarse(7).to_string(), "7 ms");
        assert_eq!(Bucket::Overflow.to_string(), ">100 ms");
        assert_eq!(PayloadBucket::for_size(5_000).to_string(), "4096-8192 B");
        assert_eq!(PayloadBucket::for_size(PAYLOAD_LIMIT).to_string(), ">=1048576 B");
    }

    #[test]
    fn drain_resets_cells() {
        let h = LatencyHistogram::new();
        h.record(50);
        h.record(55);
        h.record(150_000);
        assert_eq!(h.count(Bucket::Fine(3)), 2);

        assert_eq!(h.drain(), vec![(Bucket::Fine(3), 2), (Bucket::Overflow, 1)]);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn payload_drain_reports_overflow_last() {
        let h = PayloadSizeHistogram::new();
        h.record(0);
        h.record(4_096);
        h.record(8 * 1024 * 1024);

        assert_eq!(
            h.drain(),
            vec![
                (PayloadBucket::Sized(0), 1),
                (PayloadBucket::Sized(1), 1),
                (PayloadBucket::Overflow, 1)
            ]
        );
    }

    proptest! {
        #[test]
        fn drained_buckets_sum_to_recorded(values in prop::collection::vec(0u64..500_000, 0..300)) {
            let h = LatencyHistogram::new();
            for &v in &values {
                h.record(v);
            }
            let total: u64 = h.drain().iter().map(|(_, n)| n).sum();
            prop_assert_eq!(total, values.len() as u64);
        }
    }
}
