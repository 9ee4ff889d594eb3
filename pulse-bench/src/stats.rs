//! Latency accounting: fixed-width histograms, per-worker tallies, and the
//! percentile summaries derived after a run.
//!
//! # Sampling policy
//!
//! Recording every operation into the histogram would distort the very
//! latency being measured, so only one in every [`SAMPLE_RATE`] successful
//! operations is recorded, with weight `SAMPLE_RATE` to keep the histogram
//! calibrated for total volume. Minimum and maximum are exact: they are
//! tracked on every operation. Percentiles are therefore coarse while the
//! extremes are precise, which matches the measurement intent.

/// One in every `SAMPLE_RATE` successful operations feeds the histogram.
pub const SAMPLE_RATE: u64 = 100;

/// A latency sample is a spike when it exceeds ten times the median.
const SPIKE_FACTOR: u64 = 10;

/// Fixed-bucket-width latency histogram with an overflow counter.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    bucket_width_ns: u64,
    buckets: Vec<u64>,
    overflows: u64,
}

impl LatencyHistogram {
    /// Creates a histogram of `max_buckets` buckets, each `bucket_width_ns`
    /// wide. Bucket `i` covers `[i * width, (i + 1) * width)`.
    pub fn new(bucket_width_ns: u64, max_buckets: usize) -> Self {
        Self {
            bucket_width_ns,
            buckets: vec![0; max_buckets],
            overflows: 0,
        }
    }

    /// Adds `weight` samples of `latency_ns`.
    ///
    /// Returns `false` if the latency fell beyond the last bucket and was
    /// counted as overflow instead.
    #[inline]
    pub fn record(&mut self, latency_ns: u64, weight: u64) -> bool {
        let index = (latency_ns / self.bucket_width_ns) as usize;
        if let Some(bucket) = self.buckets.get_mut(index) {
            *bucket += weight;
            true
        } else {
            self.overflows += weight;
            false
        }
    }

    /// Sums another histogram into this one, elementwise.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.bucket_width_ns, other.bucket_width_ns);
        debug_assert_eq!(self.buckets.len(), other.buckets.len());

        for (mine, theirs) in self.buckets.iter_mut().zip(&other.buckets) {
            *mine += theirs;
        }
        self.overflows += other.overflows;
    }

    /// Total weight recorded into buckets (overflow excluded).
    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }

    /// The bucket counts.
    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    /// Width of one bucket in nanoseconds.
    pub fn bucket_width_ns(&self) -> u64 {
        self.bucket_width_ns
    }

    /// Weight of samples that fell beyond the last bucket.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Midpoint of bucket `index`, the value percentiles report.
    #[inline]
    fn midpoint(&self, index: usize) -> u64 {
        index as u64 * self.bucket_width_ns + self.bucket_width_ns / 2
    }
}

/// Percentile summary of one operation's latency distribution.
///
/// Percentiles and the mean come from the sampled histogram; min and max
/// are exact over every operation. All values are nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySummary {
    /// Smallest observed latency.
    pub min_ns: u64,
    /// Median (bucket midpoint).
    pub p50_ns: u64,
    /// 95th percentile.
    pub p95_ns: u64,
    /// 99th percentile.
    pub p99_ns: u64,
    /// 99.9th percentile.
    pub p999_ns: u64,
    /// Largest observed latency.
    pub max_ns: u64,
    /// Histogram-weighted mean.
    pub mean_ns: u64,
    /// Samples exceeding ten times the median. Histogram overflows are
    /// uniformly counted as spikes, a conservative classification.
    pub spikes: u64,
}

/// Tallies owned by one worker for the operation it performs.
///
/// Workers mutate their own `OpStats` without synchronisation; the harness
/// merges them only after joining every thread.
#[derive(Debug, Clone)]
pub struct OpStats {
    /// Successful operations.
    pub ok: u64,
    /// Full/empty failures (non-blocking mode only).
    pub failures: u64,
    /// Sampled latency distribution.
    pub histogram: LatencyHistogram,
    min_ns: u64,
    max_ns: u64,
    spikes: u64,
}

impl OpStats {
    /// Creates empty tallies with a histogram of the given shape.
    pub fn new(bucket_width_ns: u64, max_buckets: usize) -> Self {
        Self {
            ok: 0,
            failures: 0,
            histogram: LatencyHistogram::new(bucket_width_ns, max_buckets),
            min_ns: u64::MAX,
            max_ns: 0,
            spikes: 0,
        }
    }

    /// Records one successful operation.
    ///
    /// Min and max are updated on every call; the histogram once per
    /// [`SAMPLE_RATE`] calls, with that weight.
    #[inline]
    pub fn record_ok(&mut self, latency_ns: u64) {
        self.ok += 1;
        self.min_ns = self.min_ns.min(latency_ns);
        self.max_ns = self.max_ns.max(latency_ns);

        if self.ok % SAMPLE_RATE == 0 && !self.histogram.record(latency_ns, SAMPLE_RATE) {
            self.spikes += SAMPLE_RATE;
        }
    }

    /// Records one full/empty failure.
    #[inline]
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Folds another worker's tallies into this one.
    pub fn merge(&mut self, other: &Self) {
        self.ok += other.ok;
        self.failures += other.failures;
        self.min_ns = self.min_ns.min(other.min_ns);
        self.max_ns = self.max_ns.max(other.max_ns);
        self.spikes += other.spikes;
        self.histogram.merge(&other.histogram);
    }

    /// Exact minimum over all successful operations, or 0 if there were
    /// none.
    pub fn min_ns(&self) -> u64 {
        if self.ok == 0 { 0 } else { self.min_ns }
    }

    /// Exact maximum over all successful operations.
    pub fn max_ns(&self) -> u64 {
        self.max_ns
    }

    /// Derives the percentile summary from the merged histogram.
    ///
    /// For each percentile `p` the target rank is `ceil(total * p)`; the
    /// reported value is the midpoint of the first bucket whose cumulative
    /// count reaches that rank.
    pub fn summarize(&self) -> LatencySummary {
        let mut summary = LatencySummary {
            min_ns: self.min_ns(),
            max_ns: self.max_ns,
            spikes: self.spikes,
            ..LatencySummary::default()
        };

        let total = self.histogram.total();
        if total == 0 {
            return summary;
        }

        let ranks = [
            (total * 50).div_ceil(100),
            (total * 95).div_ceil(100),
            (total * 99).div_ceil(100),
            (total * 999).div_ceil(1000),
        ];
        let mut indices = [None; 4];

        let mut cumulative = 0u64;
        for (index, &count) in self.histogram.buckets().iter().enumerate() {
            cumulative += count;
            for (found, &rank) in indices.iter_mut().zip(&ranks) {
                if found.is_none() && cumulative >= rank {
                    *found = Some(index);
                }
            }
            if indices.iter().all(Option::is_some) {
                break;
            }
        }

        // Every rank is <= total, so the scan found each index.
        let [p50, p95, p99, p999] =
            indices.map(|index| self.histogram.midpoint(index.unwrap_or(0)));
        summary.p50_ns = p50;
        summary.p95_ns = p95;
        summary.p99_ns = p99;
        summary.p999_ns = p999;

        let weighted: f64 = self
            .histogram
            .buckets()
            .iter()
            .enumerate()
            .map(|(index, &count)| {
                count as f64 * (index as f64 + 0.5) * self.histogram.bucket_width_ns() as f64
            })
            .sum();
        summary.mean_ns = (weighted / total as f64) as u64;

        let threshold = SPIKE_FACTOR * summary.p50_ns;
        summary.spikes += self
            .histogram
            .buckets()
            .iter()
            .enumerate()
            .filter(|&(index, _)| self.histogram.midpoint(index) > threshold)
            .map(|(_, &count)| count)
            .sum::<u64>();

        summary
    }
}
