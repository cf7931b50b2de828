use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use prometheus::core::{Atomic as _, AtomicF64};

/// Value going both up and down.
pub struct Gauge {
    /// Current value of this [`Gauge`].
    value: AtomicF64,
}

impl Gauge {
    /// Creates a new [`Gauge`] set to zero.
    #[must_use]
    pub fn new() -> Self {
        Self { value: AtomicF64::new(0.0) }
    }

    /// Increments this [`Gauge`] by one.
    pub fn inc(&self) {
        self.value.inc_by(1.0);
    }

    /// Increments this [`Gauge`] by the provided `val`.
    pub fn inc_by(&self, val: f64) {
        self.value.inc_by(val);
    }

    /// Decrements this [`Gauge`] by one.
    pub fn dec(&self) {
        self.value.dec_by(1.0);
    }

    /// Decrements this [`Gauge`] by the provided `val`.
    pub fn dec_by(&self, val: f64) {
        self.value.dec_by(val);
    }

    /// Sets this [`Gauge`] to the provided `val`.
    pub fn set(&self, val: f64) {
        self.value.set(val);
    }

    /// Sets this [`Gauge`] to the current Unix time in seconds.
    pub fn set_to_current_time(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        self.set(now);
    }

    /// Returns the current value of this [`Gauge`].
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value.get()
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge").field("value", &self.value()).finish()
    }
}
