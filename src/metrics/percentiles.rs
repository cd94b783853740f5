use std::collections::BTreeMap;

/// Percentile breakdown of one second's worth of latencies (all μs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PercentileSet {
    pub min: u64,
    pub p50: u64,
    pub p75: u64,
    pub p95: u64,
    pub p99: u64,
    pub average: u64,
}

/// Percentiles reported for every stat item, in output order.
const PERCENTILES: [u64; 4] = [50, 75, 95, 99];

impl PercentileSet {
    /// Estimate percentiles from a latency → frequency map.
    ///
    /// The rank of percentile `p` is `floor(total * p / 100)`; its value is the
    /// first key at which the cumulative frequency reaches that rank. One pass
    /// over the distinct keys, not over the samples. Returns all zeros when
    /// `total_count` is zero.
    pub fn from_frequencies(
        frequencies: &BTreeMap<u64, u64>,
        total_count: u64,
        total_latency_us: u64,
    ) -> Self {
        if total_count == 0 {
            return Self::default();
        }

        let ranks = PERCENTILES.map(|p| total_count * p / 100);
        let mut values: [Option<u64>; 4] = [None; 4];
        let mut min = None;
        let mut cumulative = 0u64;

        for (&latency, &freq) in frequencies.iter().filter(|&(_, &f)| f > 0) {
            cumulative += freq;
            min.get_or_insert(latency);

            for (value, &rank) in values.iter_mut().zip(&ranks) {
                if value.is_none() && cumulative >= rank {
                    *value = Some(latency);
                }
            }
            if values[3].is_some() {
                break;
            }
        }

        let [p50, p75, p95, p99] = values.map(Option::unwrap_or_default);
        Self {
            min: min.unwrap_or_default(),
            p50,
            p75,
            p95,
            p99,
            average: total_latency_us / total_count.max(1),
        }
    }
}
