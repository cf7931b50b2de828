use std::{collections::VecDeque, fmt};

use parking_lot::Mutex;
use prometheus::proto;

/// Quantiles reported by a [`Summary::default()`].
pub const DEFAULT_QUANTILES: &[f64] = &[0.5, 0.9, 0.99];

/// Number of most recent observations a [`Summary::default()`] estimates its
/// quantiles over.
pub const DEFAULT_WINDOW: usize = 1024;

/// Quantiles of observed values over a sliding window of the most recent
/// observations, along with the lifetime sum and count.
pub struct Summary {
    /// Sorted quantile objectives in the `[0, 1]` range.
    quantiles: Vec<f64>,

    /// Observations and their totals.
    window: Mutex<Window>,
}

/// Sliding window of a [`Summary`].
#[derive(Debug)]
struct Window {
    /// Maximum number of retained observations.
    capacity: usize,

    /// Most recent observations, oldest first.
    samples: VecDeque<f64>,

    /// Sum of all the observations ever made.
    sum: f64,

    /// Number of all the observations ever made.
    count: u64,
}

impl Summary {
    /// Creates a new [`Summary`] reporting the provided `quantiles` over the
    /// [`DEFAULT_WINDOW`].
    #[must_use]
    pub fn new(quantiles: impl Into<Vec<f64>>) -> Self {
        Self::with_window(quantiles, DEFAULT_WINDOW)
    }

    /// Creates a new [`Summary`] reporting the provided `quantiles` over the
    /// `window` most recent observations.
    ///
    /// Quantiles outside the `[0, 1]` range are dropped. A zero `window` is
    /// treated as `1`.
    #[must_use]
    pub fn with_window(quantiles: impl Into<Vec<f64>>, window: usize) -> Self {
        let mut quantiles = quantiles.into();
        quantiles.retain(|q| (0.0..=1.0).contains(q));
        quantiles.sort_by(f64::total_cmp);
        quantiles.dedup();

        let capacity = window.max(1);
        Self {
            quantiles,
            window: Mutex::new(Window {
                capacity,
                samples: VecDeque::with_capacity(capacity),
                sum: 0.0,
                count: 0,
            }),
        }
    }

    /// Observes the provided `val`.
    pub fn observe(&self, val: f64) {
        let mut window = self.window.lock();
        if window.samples.len() == window.capacity {
            let _ = window.samples.pop_front();
        }
        window.samples.push_back(val);
        window.sum += val;
        window.count += 1;
    }

    /// Returns the quantile objectives of this [`Summary`].
    #[must_use]
    pub fn quantiles(&self) -> &[f64] {
        &self.quantiles
    }

    /// Returns the total number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.window.lock().count
    }

    /// Returns the sum of all the observed values.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.window.lock().sum
    }

    /// Takes a [`proto::Summary`] snapshot of this [`Summary`].
    ///
    /// Quantiles are estimated with the nearest-rank method, and are NaN when
    /// nothing has been observed yet.
    pub(super) fn snapshot(&self) -> proto::Summary {
        let (mut sorted, sum, count) = {
            let window = self.window.lock();
            (
                window.samples.iter().copied().collect::<Vec<_>>(),
                window.sum,
                window.count,
            )
        };
        sorted.sort_by(f64::total_cmp);

        let quantiles = self
            .quantiles
            .iter()
            .map(|&q| {
                let mut quantile = proto::Quantile::default();
                quantile.set_quantile(q);
                quantile.set_value(nearest_rank(&sorted, q));
                quantile
            })
            .collect::<Vec<_>>();

        let mut out = proto::Summary::default();
        out.set_sample_count(count);
        out.set_sample_sum(sum);
        out.set_quantile(quantiles.into());
        out
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self::new(DEFAULT_QUANTILES)
    }
}

impl fmt::Debug for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Summary")
            .field("quantiles", &self.quantiles)
            .field("window", &*self.window.lock())
            .finish()
    }
}

/// Picks the `q` quantile out of the `sorted` observations.
#[allow( // intentional
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn nearest_rank(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::{nearest_rank, Summary};

    #[test]
    fn estimates_quantiles() {
        let summary = Summary::new([0.5, 0.9, 1.0, 0.0]);
        for val in (1..=10).rev() {
            summary.observe(f64::from(val));
        }

        let snapshot = summary.snapshot();
        let quantiles = snapshot
            .get_quantile()
            .iter()
            .map(|q| (q.get_quantile(), q.get_value()))
            .collect::<Vec<_>>();
        assert_eq!(quantiles, [(0.0, 1.0), (0.5, 5.0), (0.9, 9.0), (1.0, 10.0)]);
        assert_eq!(snapshot.get_sample_count(), 10);
        assert_eq!(snapshot.get_sample_sum(), 55.0);
    }

    #[test]
    fn slides_window_but_keeps_totals() {
        let summary = Summary::with_window([1.0], 2);
        for val in [100.0, 1.0, 2.0] {
            summary.observe(val);
        }

        let snapshot = summary.snapshot();
        assert_eq!(snapshot.get_quantile()[0].get_value(), 2.0);
        assert_eq!(summary.count(), 3);
        assert_eq!(summary.sum(), 103.0);
    }

    #[test]
    fn drops_invalid_quantiles() {
        let summary = Summary::new([1.5, -0.1, 0.5, f64::NAN]);

        assert_eq!(summary.quantiles(), &[0.5]);
    }

    #[test]
    fn reports_nan_when_empty() {
        assert!(nearest_rank(&[], 0.5).is_nan());
    }
}
