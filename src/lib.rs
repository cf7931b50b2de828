//! Thread-safe registry of [`prometheus`] metric families.
//!
//! A [`Registry`] hands out metric [`Family`]s by name, keeps every name bound
//! to a single metric kind, and collects all of them into
//! [`prometheus::proto::MetricFamily`] snapshots ready for any
//! [`prometheus::Encoder`].
//!
//! ```rust
//! use prometheus_families::{build, metric::Histogram, Collectable as _};
//!
//! let registry = prometheus_families::Registry::new();
//!
//! let latency = build::histogram()
//!     .name("request_duration_seconds")
//!     .help("Request latency.")
//!     .label("service", "api")
//!     .register(&registry)?;
//! latency
//!     .add_with([("method", "GET")], || Histogram::new([0.1, 1.0]))
//!     .observe(0.25);
//!
//! let collected = registry.collect();
//! assert_eq!(collected.len(), 1);
//! assert_eq!(collected[0].get_metric()[0].get_histogram().get_sample_count(), 1);
//! # Ok::<_, prometheus_families::Error>(())
//! ```

pub mod build;
pub mod error;
pub mod failure;
pub mod family;
pub mod metric;
pub mod recorder;
pub mod registry;
pub mod storage;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use prometheus::proto;

#[doc(inline)]
pub use self::{
    error::{Error, Result},
    family::Family,
    metric::Metric,
    recorder::Recorder,
    registry::Registry,
};

/// Label names mapped to their values.
///
/// Equality doesn't depend on the insertion order, and iteration is sorted by
/// label names.
pub type Labels = BTreeMap<String, String>;

/// Source of [`proto::MetricFamily`] snapshots.
pub trait Collectable {
    /// Returns the current snapshots of zero or more metric families.
    ///
    /// The returned snapshots are detached copies: later updates of the metrics
    /// don't affect them.
    #[must_use]
    fn collect(&self) -> Vec<proto::MetricFamily>;
}

impl<T: Collectable + ?Sized> Collectable for &T {
    fn collect(&self) -> Vec<proto::MetricFamily> {
        (**self).collect()
    }
}

impl<T: Collectable + ?Sized> Collectable for std::sync::Arc<T> {
    fn collect(&self) -> Vec<proto::MetricFamily> {
        (**self).collect()
    }
}

/// Returns the process-wide [`Registry`] with the
/// [`InsertBehavior::Append`].
///
/// [`InsertBehavior::Append`]: registry::InsertBehavior::Append
#[must_use]
pub fn default_registry() -> &'static Registry {
    static DEFAULT: Lazy<Registry> = Lazy::new(Registry::new);

    &DEFAULT
}

/// Builds a default [`Recorder`] and installs it as [`metrics::recorder()`].
///
/// # Panics
///
/// If a [`metrics::Recorder`] is installed already.
pub fn install() -> Recorder {
    Recorder::builder().build_and_install()
}
