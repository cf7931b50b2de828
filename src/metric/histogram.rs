use std::fmt;

use prometheus::{
    core::{Atomic as _, AtomicF64, AtomicU64},
    proto,
};

/// Distribution of observed values over fixed buckets.
pub struct Histogram {
    /// Sorted finite upper bounds of the buckets.
    ///
    /// The `+Inf` bucket is implicit.
    bounds: Vec<f64>,

    /// Non-cumulative observation counts per bucket, with the `+Inf` bucket
    /// being the last one.
    buckets: Vec<AtomicU64>,

    /// Sum of all the observed values.
    sum: AtomicF64,
}

impl Histogram {
    /// Creates a new [`Histogram`] with the provided bucket upper `bounds`.
    ///
    /// Bounds are sorted and deduplicated. Non-finite bounds are dropped, as
    /// the `+Inf` bucket is always present.
    #[must_use]
    pub fn new(bounds: impl Into<Vec<f64>>) -> Self {
        let mut bounds = bounds.into();
        bounds.retain(|b| b.is_finite());
        bounds.sort_by(f64::total_cmp);
        bounds.dedup();

        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self { bounds, buckets, sum: AtomicF64::new(0.0) }
    }

    /// Observes the provided `val`, adding it to the first bucket whose
    /// upper bound is not less than it.
    ///
    /// NaN values are ignored, as they fit no bucket.
    pub fn observe(&self, val: f64) {
        if val.is_nan() {
            return;
        }
        let idx = self.bounds.partition_point(|b| *b < val);
        self.buckets[idx].inc_by(1);
        self.sum.inc_by(val);
    }

    /// Returns the upper bounds of the finite buckets of this [`Histogram`].
    #[must_use]
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Returns the total number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.buckets.iter().map(|b| b.get()).sum()
    }

    /// Returns the sum of all the observed values.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum.get()
    }

    /// Takes a [`proto::Histogram`] snapshot of this [`Histogram`] with
    /// cumulative bucket counts.
    pub(super) fn snapshot(&self) -> proto::Histogram {
        let mut cumulative = 0;
        let buckets = self
            .bounds
            .iter()
            .zip(&self.buckets)
            .map(|(bound, count)| {
                cumulative += count.get();
                let mut bucket = proto::Bucket::default();
                bucket.set_upper_bound(*bound);
                bucket.set_cumulative_count(cumulative);
                bucket
            })
            .collect::<Vec<_>>();
        let total = cumulative + self.buckets[self.bounds.len()].get();

        let mut out = proto::Histogram::default();
        out.set_sample_count(total);
        out.set_sample_sum(self.sum());
        out.set_bucket(buckets.into());
        out
    }
}

impl Default for Histogram {
    /// Creates a new [`Histogram`] with the [`prometheus::DEFAULT_BUCKETS`].
    fn default() -> Self {
        Self::new(prometheus::DEFAULT_BUCKETS.to_vec())
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("bounds", &self.bounds)
            .field("count", &self.count())
            .field("sum", &self.sum())
            .finish()
    }
}
