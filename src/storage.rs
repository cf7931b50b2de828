//! [`metrics::registry::Storage`] backed by a [`Registry`].
//!
//! [`metrics::registry::Storage`]: metrics_util::registry::Storage

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{
    build,
    metric::{Counter, Gauge, Histogram, Kind, Metric},
    registry::{Catalog, Collection, Get},
    Error, Labels, Registry, Result,
};

/// [`metrics::registry::Storage`] registering [`metrics`] crate metrics as
/// instances of [`Family`]s in a [`Registry`].
///
/// Every [`metrics::Key`] name maps to a [`Family`] without constant labels,
/// while the [`metrics::Key`] labels identify an instance inside it. So, the
/// backing [`Registry`] should use the [`InsertBehavior::Merge`] to report all
/// the instances sharing a name as a single [`Family`].
///
/// # Errors
///
/// This [`Storage`] returns [`Fallible`] in its
/// [`metrics::registry::Storage`] interface, because it cannot panic, as is
/// called inside [`metrics::Registry`] and, so, may poison its inner locks.
/// That's why possible errors are passed through, up to the
/// [`metrics::Recorder`] using this [`Storage`], and should be resolved there.
///
/// [`Family`]: crate::Family
/// [`InsertBehavior::Merge`]: crate::registry::InsertBehavior::Merge
/// [`metrics::Registry`]: metrics_util::registry::Registry
/// [`metrics::registry::Storage`]: metrics_util::registry::Storage
#[derive(Clone, Debug)]
pub struct Storage {
    /// [`Registry`] backing this [`Storage`].
    registry: Arc<Registry>,

    /// Help descriptions provided for metrics of a [`Kind`] and a name,
    /// whether their [`Family`] exists already or not.
    ///
    /// [`Family`]: crate::Family
    descriptions: Arc<RwLock<HashMap<(Kind, String), String>>>,
}

impl Storage {
    /// Creates a new [`Storage`] backed by the provided [`Registry`].
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry, descriptions: Arc::default() }
    }

    /// Returns the [`Registry`] backing this [`Storage`].
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Changes the help description of the `M`etric [`Family`] identified by
    /// its `name`, or remembers it for the [`Family`] to be created later.
    ///
    /// Intended to be used in [`metrics::Recorder::describe_counter()`],
    /// [`metrics::Recorder::describe_gauge()`] and
    /// [`metrics::Recorder::describe_histogram()`] implementations.
    ///
    /// [`Family`]: crate::Family
    pub fn describe<M>(&self, name: &str, description: String)
    where
        M: Metric,
        Catalog: Get<Collection<M>>,
    {
        drop(
            self.descriptions
                .write()
                .insert((M::KIND, name.to_owned()), description.clone()),
        );
        if let Some(family) = self.registry.find::<M>(name, &Labels::new()) {
            family.describe(description);
        }
    }

    /// Returns the remembered help description of the `M`etric [`Family`]
    /// identified by its `name`.
    ///
    /// [`Family`]: crate::Family
    fn description<M: Metric>(&self, name: &str) -> Option<String> {
        self.descriptions.read().get(&(M::KIND, name.to_owned())).cloned()
    }

    /// Returns the `M`etric instance identified by the provided
    /// [`metrics::Key`], creating its [`Family`] and the instance itself if
    /// needed.
    ///
    /// Until described, a [`Family`] uses its name as the help description.
    ///
    /// # Errors
    ///
    /// - If the [`metrics::Key`] has an invalid metric or label name.
    /// - If the [`metrics::Key`] name is taken by another [`Kind`] in the
    ///   [`Registry`].
    ///
    /// [`Family`]: crate::Family
    fn register<M>(&self, key: &metrics::Key) -> Result<Arc<M>>
    where
        M: Metric + Default,
        Catalog: Get<Collection<M>>,
    {
        let name = key.name();
        if !build::is_valid_metric_name(name) {
            return Err(Error::InvalidMetricName(name.into()));
        }
        if let Some(l) =
            key.labels().find(|l| !build::is_valid_label_name(l.key()))
        {
            return Err(Error::InvalidLabelName(l.key().into()));
        }

        let help = self.description::<M>(name);
        let family = self.registry.family::<M>(
            name,
            help.as_deref().unwrap_or(name),
            &Labels::new(),
        )?;
        // The description might have been provided while the `Family` was
        // being created.
        if let Some(desc) = self.description::<M>(name) {
            family.describe(desc);
        }

        Ok(family.add(key.labels().map(|l| (l.key(), l.value()))))
    }
}

impl metrics_util::registry::Storage<metrics::Key> for Storage {
    // PANIC: We cannot panic inside `metrics_util::registry::Storage`
    //        implementation, because it will poison locks used inside
    //        `metrics_util::registry::Registry`. That's why we should pass
    //        possible errors through it and deal with them inside
    //        `metrics::Recorder` implementation.
    type Counter = Fallible<Counter>;
    type Gauge = Fallible<Gauge>;
    type Histogram = Fallible<Histogram>;

    fn counter(&self, key: &metrics::Key) -> Self::Counter {
        self.register::<Counter>(key).into()
    }

    fn gauge(&self, key: &metrics::Key) -> Self::Gauge {
        self.register::<Gauge>(key).into()
    }

    fn histogram(&self, key: &metrics::Key) -> Self::Histogram {
        self.register::<Histogram>(key).into()
    }
}

/// Result of registering an `M`etric in a [`Storage`], cached by a
/// [`metrics::Registry`].
///
/// [`metrics::Registry`]: metrics_util::registry::Registry
#[derive(Debug)]
pub struct Fallible<M>(pub Arc<Result<Arc<M>>>);

// Manual implementation is required to omit the redundant `M: Clone` trait
// bound imposed by `#[derive(Clone)]`.
impl<M> Clone for Fallible<M> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<M> From<Result<Arc<M>>> for Fallible<M> {
    fn from(res: Result<Arc<M>>) -> Self {
        Self(Arc::new(res))
    }
}

impl<M> Fallible<M> {
    /// Returns the registered `M`etric, or the [`Error`] it failed with.
    ///
    /// # Errors
    ///
    /// If the `M`etric failed to be registered.
    pub fn as_ref(&self) -> std::result::Result<&Arc<M>, &Error> {
        (*self.0).as_ref()
    }
}

impl<M: metrics::CounterFn> metrics::CounterFn for Fallible<M> {
    fn increment(&self, val: u64) {
        if let Ok(m) = &*self.0 {
            m.increment(val);
        }
    }

    fn absolute(&self, val: u64) {
        if let Ok(m) = &*self.0 {
            m.absolute(val);
        }
    }
}

impl<M: metrics::GaugeFn> metrics::GaugeFn for Fallible<M> {
    fn increment(&self, val: f64) {
        if let Ok(m) = &*self.0 {
            m.increment(val);
        }
    }

    fn decrement(&self, val: f64) {
        if let Ok(m) = &*self.0 {
            m.decrement(val);
        }
    }

    fn set(&self, val: f64) {
        if let Ok(m) = &*self.0 {
            m.set(val);
        }
    }
}

impl<M: metrics::HistogramFn> metrics::HistogramFn for Fallible<M> {
    fn record(&self, val: f64) {
        if let Ok(m) = &*self.0 {
            m.record(val);
        }
    }
}
