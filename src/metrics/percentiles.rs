use hdrhistogram::Histogram;
use serde::Serialize;

/// Percentile breakdown of one latency histogram (tick or write), in μs.
///
/// Ticks arrive every few seconds, so the tail stops at p99; a p99.9 over a
/// few hundred samples would just repeat the max.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub count: u64,
}

impl PercentileSet {
    /// Zeroed set for an empty histogram.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.is_empty() {
            return Self::default();
        }

        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p90: hist.value_at_quantile(0.90),
            p99: hist.value_at_quantile(0.99),
            count: hist.len(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram() -> Histogram<u64> {
        Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap()
    }

    #[test]
    fn empty_histogram_yields_zeroes() {
        let set = PercentileSet::from_histogram(&histogram());
        assert!(!set.has_data());
        assert_eq!(set.p99, 0);
    }

    #[test]
    fn percentiles_are_ordered() {
        let mut hist = histogram();
        for v in 1..=1_000u64 {
            hist.record(v).unwrap();
        }
        let set = PercentileSet::from_histogram(&hist);
        assert_eq!(set.count, 1_000);
        assert_eq!(set.min, 1);
        assert!(set.p50 <= set.p90 && set.p90 <= set.p99 && set.p99 <= set.max);
    }
}
