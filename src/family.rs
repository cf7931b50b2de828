//! [`Family`] of label-distinguished metric instances.

use std::{collections::BTreeMap, fmt, sync::Arc};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use prometheus::proto;

use crate::{metric::Metric, Collectable, Labels};

/// Named group of same-kind `M`etrics distinguished by their label sets.
///
/// A [`Family`] has a name and constant labels fixed on creation, and a help
/// description which may be changed at any time via [`Family::describe()`].
/// Instances are created on demand with [`Family::add()`] or
/// [`Family::add_with()`], and may be updated from any thread.
///
/// # Example
///
/// ```rust
/// use prometheus_families::{metric::Counter, Collectable as _, Family};
///
/// let family = Family::<Counter>::new("requests", "Served requests.", [
///     ("service".to_owned(), "api".to_owned()),
/// ].into());
///
/// family.add([("method", "GET")]).inc();
/// family.add([("method", "GET")]).inc();
/// family.add([("method", "POST")]).inc_by(3.0);
///
/// let report = prometheus::TextEncoder::new()
///     .encode_to_string(&family.collect())?;
/// assert_eq!(
///     report.trim(),
///     r#"
/// ## HELP requests Served requests.
/// ## TYPE requests counter
/// requests{method="GET",service="api"} 2
/// requests{method="POST",service="api"} 3
///     "#
///     .trim(),
/// );
/// # Ok::<_, prometheus::Error>(())
/// ```
pub struct Family<M> {
    /// Name of this [`Family`].
    name: String,

    /// Help description of this [`Family`].
    help: ArcSwap<String>,

    /// Labels attached to every instance of this [`Family`].
    constant_labels: Labels,

    /// Instances of this [`Family`] along with their own labels.
    metrics: Mutex<BTreeMap<Labels, Arc<M>>>,
}

impl<M> Family<M> {
    /// Creates a new empty [`Family`].
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        constant_labels: Labels,
    ) -> Self {
        Self {
            name: name.into(),
            help: ArcSwap::from_pointee(help.into()),
            constant_labels,
            metrics: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the name of this [`Family`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current help description of this [`Family`].
    #[must_use]
    pub fn help(&self) -> Arc<String> {
        self.help.load_full()
    }

    /// Replaces the help description reported by the next collections of this
    /// [`Family`].
    pub fn describe(&self, help: impl Into<String>) {
        self.help.store(Arc::new(help.into()));
    }

    /// Returns the constant labels of this [`Family`].
    #[must_use]
    pub fn constant_labels(&self) -> &Labels {
        &self.constant_labels
    }

    /// Returns the `M`etric instance identified by the provided `labels`, if
    /// any.
    #[must_use]
    pub fn get(&self, labels: &Labels) -> Option<Arc<M>> {
        self.metrics.lock().get(labels).cloned()
    }

    /// Returns the `M`etric instance identified by the provided `labels`,
    /// creating it with a [`Default`] value if it doesn't exist yet.
    pub fn add<I, K, V>(&self, labels: I) -> Arc<M>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        M: Default,
    {
        self.add_with(labels, M::default)
    }

    /// Returns the `M`etric instance identified by the provided `labels`,
    /// creating it with the provided `init` function if it doesn't exist yet.
    ///
    /// `init` is not called when the instance exists already, so the very
    /// first parameters (like [`Histogram`] buckets) stay in effect.
    ///
    /// [`Histogram`]: crate::metric::Histogram
    pub fn add_with<I, K, V>(
        &self,
        labels: I,
        init: impl FnOnce() -> M,
    ) -> Arc<M>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let labels = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<Labels>();
        debug_assert!(
            labels.keys().all(|k| !self.constant_labels.contains_key(k)),
            "instance labels of `{}` family overlap its constant labels",
            self.name,
        );

        Arc::clone(self.metrics.lock().entry(labels).or_insert_with_key(|l| {
            tracing::trace!(family = %self.name, labels = ?l, "new instance");
            Arc::new(init())
        }))
    }

    /// Removes the provided `M`etric instance from this [`Family`], so it
    /// isn't reported anymore.
    ///
    /// Returns `false` if the instance doesn't belong to this [`Family`].
    pub fn remove(&self, metric: &Arc<M>) -> bool {
        let mut metrics = self.metrics.lock();
        let before = metrics.len();
        metrics.retain(|_, m| !Arc::ptr_eq(m, metric));
        metrics.len() != before
    }

    /// Returns the number of `M`etric instances in this [`Family`].
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.lock().len()
    }

    /// Indicates whether this [`Family`] has no `M`etric instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.lock().is_empty()
    }

    /// Builds [`proto::LabelPair`]s of an instance having the provided
    /// `labels`, overriding the constant ones.
    fn label_pairs(&self, labels: &Labels) -> Vec<proto::LabelPair> {
        let mut merged = self
            .constant_labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<BTreeMap<_, _>>();
        merged.extend(labels.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        merged
            .into_iter()
            .map(|(name, value)| {
                let mut pair = proto::LabelPair::default();
                pair.set_name(name.to_owned());
                pair.set_value(value.to_owned());
                pair
            })
            .collect()
    }
}

impl<M: Metric> Collectable for Family<M> {
    /// Returns a single snapshot holding every instance of this [`Family`],
    /// even if there are none.
    fn collect(&self) -> Vec<proto::MetricFamily> {
        let metrics = self
            .metrics
            .lock()
            .iter()
            .map(|(labels, metric)| {
                let mut sample = metric.sample();
                sample.set_label(self.label_pairs(labels).into());
                sample
            })
            .collect::<Vec<_>>();

        let mut out = proto::MetricFamily::default();
        out.set_name(self.name.clone());
        out.set_help((*self.help()).clone());
        out.set_field_type(M::KIND.metric_type());
        out.set_metric(metrics.into());
        vec![out]
    }
}

impl<M> fmt::Debug for Family<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Family")
            .field("name", &self.name)
            .field("help", &self.help())
            .field("constant_labels", &self.constant_labels)
            .field("metrics", &self.len())
            .finish()
    }
}
