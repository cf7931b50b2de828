use std::fmt;

use prometheus::core::{Atomic as _, AtomicF64};

/// Monotonically increasing value.
pub struct Counter {
    /// Current value of this [`Counter`].
    value: AtomicF64,
}

impl Counter {
    /// Creates a new [`Counter`] starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self { value: AtomicF64::new(0.0) }
    }

    /// Increments this [`Counter`] by one.
    pub fn inc(&self) {
        self.value.inc_by(1.0);
    }

    /// Increments this [`Counter`] by the provided `val`.
    ///
    /// Negative and NaN values are ignored, as a [`Counter`] never goes down.
    pub fn inc_by(&self, val: f64) {
        if val >= 0.0 {
            self.value.inc_by(val);
        }
    }

    /// Returns the current value of this [`Counter`].
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value.get()
    }

    /// Overwrites the current value of this [`Counter`].
    ///
    /// Only for sources reporting absolute values themselves.
    pub(crate) fn reset_to(&self, val: f64) {
        self.value.set(val);
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter").field("value", &self.value()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Counter;

    #[test]
    fn ignores_negative_and_nan_increments() {
        let counter = Counter::new();
        counter.inc();
        counter.inc_by(2.5);
        counter.inc_by(-1.0);
        counter.inc_by(f64::NAN);

        assert_eq!(counter.value(), 3.5);
    }
}
