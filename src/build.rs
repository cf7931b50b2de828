//! Fluent declaration of metric [`Family`]s.
//!
//! ```rust
//! use prometheus_families::{build, Registry};
//!
//! let registry = Registry::new();
//!
//! let family = build::counter()
//!     .name("jobs_total")
//!     .help("Processed jobs.")
//!     .label("queue", "default")
//!     .register(&registry)?;
//! family.add([("status", "done")]).inc();
//!
//! assert!(build::gauge().name("jobs_total").register(&registry).is_err());
//! assert!(build::gauge().name("0_jobs").register(&registry).is_err());
//! # Ok::<_, prometheus_families::Error>(())
//! ```

use std::{fmt, marker::PhantomData};

use crate::{
    error::{Error, Result},
    metric::{Counter, Gauge, Histogram, Metric, Summary},
    registry::{Catalog, Collection, Get},
    Family, Labels, Registry,
};

/// Starts declaring a [`Counter`] [`Family`].
pub fn counter() -> Builder<Counter> {
    Builder::new()
}

/// Starts declaring a [`Gauge`] [`Family`].
pub fn gauge() -> Builder<Gauge> {
    Builder::new()
}

/// Starts declaring a [`Histogram`] [`Family`].
pub fn histogram() -> Builder<Histogram> {
    Builder::new()
}

/// Starts declaring a [`Summary`] [`Family`].
pub fn summary() -> Builder<Summary> {
    Builder::new()
}

/// Builder of an `M`etric [`Family`] declaration.
#[must_use]
pub struct Builder<M> {
    /// Name of the declared [`Family`].
    name: String,

    /// Help description of the declared [`Family`].
    help: String,

    /// Constant labels of the declared [`Family`].
    labels: Labels,

    /// Kind of the declared [`Family`].
    _metric: PhantomData<fn() -> M>,
}

impl<M> Builder<M> {
    fn new() -> Self {
        Self {
            name: String::new(),
            help: String::new(),
            labels: Labels::new(),
            _metric: PhantomData,
        }
    }

    /// Sets the name of the declared [`Family`].
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the help description of the declared [`Family`].
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Adds a constant label to the declared [`Family`], replacing the
    /// previous value of the same label, if any.
    pub fn label(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        drop(self.labels.insert(name.into(), value.into()));
        self
    }

    /// Adds multiple constant labels to the declared [`Family`].
    pub fn labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Registers the declared [`Family`] in the provided [`Registry`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMetricName`] if the name is not a valid metric name;
    /// - [`Error::InvalidLabelName`] if any constant label has an invalid
    ///   name;
    /// - [`Error::TypeConflict`] if the name is already taken in the
    ///   [`Registry`] by another metric kind.
    pub fn register(self, registry: &Registry) -> Result<&Family<M>>
    where
        M: Metric,
        Catalog: Get<Collection<M>>,
    {
        if !is_valid_metric_name(&self.name) {
            return Err(Error::InvalidMetricName(self.name));
        }
        if let Some(l) = self.labels.keys().find(|l| !is_valid_label_name(l)) {
            return Err(Error::InvalidLabelName(l.clone()));
        }
        registry.family(&self.name, &self.help, &self.labels)
    }
}

impl<M> fmt::Debug for Builder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("name", &self.name)
            .field("help", &self.help)
            .field("labels", &self.labels)
            .finish()
    }
}

/// Checks whether the provided `name` is a valid metric name: matches
/// `[a-zA-Z_:][a-zA-Z0-9_:]*` and doesn't start with the reserved `__`.
#[must_use]
pub fn is_valid_metric_name(name: &str) -> bool {
    is_valid_name(name, |c| c.is_ascii_alphabetic() || c == '_' || c == ':')
}

/// Checks whether the provided `name` is a valid label name: matches
/// `[a-zA-Z_][a-zA-Z0-9_]*` and doesn't start with the reserved `__`.
#[must_use]
pub fn is_valid_label_name(name: &str) -> bool {
    is_valid_name(name, |c| c.is_ascii_alphabetic() || c == '_')
}

/// Checks the provided `name` for the `first` character predicate, followed by
/// characters matching either it or an ASCII digit.
fn is_valid_name(name: &str, first: impl Fn(char) -> bool) -> bool {
    let mut chars = name.chars();
    !name.starts_with("__")
        && chars.next().map_or(false, &first)
        && chars.all(|c| first(c) || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use crate::{metric::Kind, Collectable as _, Error, Registry};

    use super::{
        counter, gauge, histogram, is_valid_label_name, is_valid_metric_name,
        summary,
    };

    #[test]
    fn validates_metric_names() {
        for valid in ["a", "_a", "a:b", "http_requests_total", "A9", ":x"] {
            assert!(is_valid_metric_name(valid), "`{valid}` should be valid");
        }
        for invalid in ["", "9a", "a-b", "__reserved", "a b", "ünicode"] {
            assert!(!is_valid_metric_name(invalid), "`{invalid}` is invalid");
        }
    }

    #[test]
    fn validates_label_names() {
        for valid in ["a", "_a", "method", "le9"] {
            assert!(is_valid_label_name(valid), "`{valid}` should be valid");
        }
        for invalid in ["", "9a", "a:b", "__name__", "a-b"] {
            assert!(!is_valid_label_name(invalid), "`{invalid}` is invalid");
        }
    }

    #[test]
    fn registers_declared_family() {
        let registry = Registry::new();

        let family = summary()
            .name("rpc_seconds")
            .help("RPC latency.")
            .labels([("service", "api"), ("zone", "a")])
            .label("zone", "b")
            .register(&registry)
            .unwrap();

        assert_eq!(family.name(), "rpc_seconds");
        assert_eq!(*family.help(), "RPC latency.");
        assert_eq!(
            family.constant_labels().get("zone").map(String::as_str),
            Some("b"),
        );
        assert_eq!(family.constant_labels().len(), 2);
        assert_eq!(
            registry.collect()[0].get_field_type(),
            Kind::Summary.metric_type(),
        );
    }

    #[test]
    fn rejects_invalid_names_before_registering() {
        let registry = Registry::new();

        assert_eq!(
            counter().name("bad-name").register(&registry).unwrap_err(),
            Error::InvalidMetricName("bad-name".into()),
        );
        assert_eq!(
            gauge()
                .name("ok")
                .label("__bad", "v")
                .register(&registry)
                .unwrap_err(),
            Error::InvalidLabelName("__bad".into()),
        );
        assert!(registry.collect().is_empty());
    }

    #[test]
    fn surfaces_type_conflicts() {
        let registry = Registry::new();
        histogram().name("x").register(&registry).unwrap();

        assert!(matches!(
            counter().name("x").register(&registry),
            Err(Error::TypeConflict { existing: Kind::Histogram, .. }),
        ));
    }
}
