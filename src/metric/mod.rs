//! Metric instances stored in a [`Family`].
//!
//! [`Family`]: crate::Family

mod counter;
mod gauge;
mod histogram;
mod summary;

use std::fmt;

use prometheus::proto;
use sealed::sealed;

#[doc(inline)]
pub use self::{
    counter::Counter,
    gauge::Gauge,
    histogram::Histogram,
    summary::{Summary, DEFAULT_QUANTILES, DEFAULT_WINDOW},
};

/// Kind of a metric, binding a metric name for the whole lifetime of a
/// [`Registry`].
///
/// [`Registry`]: crate::Registry
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Kind {
    /// [`Counter`] metric.
    Counter,

    /// [`Gauge`] metric.
    Gauge,

    /// [`Histogram`] metric.
    Histogram,

    /// [`Summary`] metric.
    Summary,
}

impl Kind {
    /// All the [`Kind`]s, in the order their families are collected.
    pub const ALL: [Self; 4] =
        [Self::Counter, Self::Gauge, Self::Histogram, Self::Summary];

    /// Returns the [`proto::MetricType`] reported in snapshots of this
    /// [`Kind`].
    #[must_use]
    pub const fn metric_type(self) -> proto::MetricType {
        match self {
            Self::Counter => proto::MetricType::COUNTER,
            Self::Gauge => proto::MetricType::GAUGE,
            Self::Histogram => proto::MetricType::HISTOGRAM,
            Self::Summary => proto::MetricType::SUMMARY,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
        })
    }
}

/// Metric instance living inside a [`Family`].
///
/// Implemented only for [`Counter`], [`Gauge`], [`Histogram`] and
/// [`Summary`].
///
/// [`Family`]: crate::Family
#[sealed]
pub trait Metric: Send + Sync + 'static {
    /// [`Kind`] of this [`Metric`].
    const KIND: Kind;

    /// Samples the current value of this [`Metric`].
    ///
    /// Labels are left empty: they are owned by the [`Family`] and filled
    /// there.
    ///
    /// [`Family`]: crate::Family
    #[must_use]
    fn sample(&self) -> proto::Metric;
}

#[sealed]
impl Metric for Counter {
    const KIND: Kind = Kind::Counter;

    fn sample(&self) -> proto::Metric {
        let mut counter = proto::Counter::default();
        counter.set_value(self.value());

        let mut out = proto::Metric::default();
        out.set_counter(counter);
        out
    }
}

#[sealed]
impl Metric for Gauge {
    const KIND: Kind = Kind::Gauge;

    fn sample(&self) -> proto::Metric {
        let mut gauge = proto::Gauge::default();
        gauge.set_value(self.value());

        let mut out = proto::Metric::default();
        out.set_gauge(gauge);
        out
    }
}

#[sealed]
impl Metric for Histogram {
    const KIND: Kind = Kind::Histogram;

    fn sample(&self) -> proto::Metric {
        let mut out = proto::Metric::default();
        out.set_histogram(self.snapshot());
        out
    }
}

#[sealed]
impl Metric for Summary {
    const KIND: Kind = Kind::Summary;

    fn sample(&self) -> proto::Metric {
        let mut out = proto::Metric::default();
        out.set_summary(self.snapshot());
        out
    }
}

impl metrics::CounterFn for Counter {
    #[allow(clippy::cast_precision_loss)] // intentional
    fn increment(&self, val: u64) {
        self.inc_by(val as f64);
    }

    #[allow(clippy::cast_precision_loss)] // intentional
    fn absolute(&self, val: u64) {
        self.reset_to(val as f64);
    }
}

impl metrics::GaugeFn for Gauge {
    fn increment(&self, val: f64) {
        self.inc_by(val);
    }

    fn decrement(&self, val: f64) {
        self.dec_by(val);
    }

    fn set(&self, val: f64) {
        Self::set(self, val);
    }
}

impl metrics::HistogramFn for Histogram {
    fn record(&self, val: f64) {
        self.observe(val);
    }
}
