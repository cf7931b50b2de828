//! [`metrics::Recorder`] implementation.

use std::{fmt, sync::Arc};

use crate::{
    failure::{self, strategy::PanicInDebugNoOpInRelease},
    metric::{Counter, Gauge, Histogram},
    registry::InsertBehavior,
    storage, Registry,
};

/// [`metrics::Recorder`] registering metrics as [`Family`] instances in a
/// [`Registry`] and powered by a [`metrics::Registry`] built on top of a
/// [`storage::Storage`].
///
/// By default, the built [`Recorder`] uses a new [`Registry`] with the
/// [`InsertBehavior::Merge`], so all the metrics sharing a name are reported
/// as a single [`Family`].
///
/// # Example
///
/// ```rust
/// use prometheus_families::Collectable as _;
///
/// let recorder = prometheus_families::install();
///
/// metrics::increment_counter!("count", "whose" => "mine", "kind" => "owned");
/// metrics::increment_counter!("count", "whose" => "mine", "kind" => "ref");
/// metrics::increment_counter!("count", "kind" => "owned", "whose" => "mine");
/// metrics::gauge!("value", 3.0);
///
/// // Metrics can be described anytime.
/// metrics::describe_counter!("count", "Example of counter.");
///
/// let report = prometheus::TextEncoder::new()
///     .encode_to_string(&recorder.registry().collect())?;
/// assert_eq!(
///     report.trim(),
///     r#"
/// ## HELP count Example of counter.
/// ## TYPE count counter
/// count{kind="owned",whose="mine"} 2
/// count{kind="ref",whose="mine"} 1
/// ## HELP value value
/// ## TYPE value gauge
/// value 3
///     "#
///     .trim(),
/// );
/// # Ok::<_, prometheus::Error>(())
/// ```
///
/// # Errors
///
/// A [`Registry`] binds every metric name to a single metric kind, so using
/// the same name for, say, a counter and a gauge via [`metrics`] crate will
/// make the [`Registry`] return an [`Error`] instead of registering the
/// metric. The returned [`Error`] can be either turned into a panic, or just
/// silently ignored, making this [`Recorder`] to return a no-op metric
/// instead (see [`metrics::Counter::noop()`] for example).
///
/// The desired behavior can be specified with a [`failure::Strategy`]
/// implementation of this [`Recorder`]. By default a
/// [`PanicInDebugNoOpInRelease`] [`failure::Strategy`] is used. See
/// [`failure::strategy`] module for other available [`failure::Strategy`]s, or
/// provide your own one by implementing the [`failure::Strategy`] trait.
///
/// ```rust,should_panic
/// use prometheus_families::failure::strategy;
///
/// prometheus_families::Recorder::builder()
///     .with_failure_strategy(strategy::Panic)
///     .build_and_install();
///
/// metrics::increment_counter!("count");
/// // This panics, as `count` is a counter already.
/// metrics::increment_gauge!("count", 1.0);
/// ```
///
/// [`Error`]: crate::Error
/// [`Family`]: crate::Family
/// [`metrics::Registry`]: metrics_util::registry::Registry
#[derive(Clone)]
pub struct Recorder<FailureStrategy = PanicInDebugNoOpInRelease> {
    /// [`metrics::Registry`] providing performant access to the stored metrics.
    ///
    /// [`metrics::Registry`]: metrics_util::registry::Registry
    metrics:
        Arc<metrics_util::registry::Registry<metrics::Key, storage::Storage>>,

    /// [`storage::Storage`] backing the [`metrics::Registry`] and registering
    /// metrics in its [`Registry`].
    ///
    /// [`metrics::Registry`]: metrics_util::registry::Registry
    storage: storage::Storage,

    /// [`failure::Strategy`] to apply when an [`Error`] is encountered inside
    /// [`metrics::Recorder`] methods.
    ///
    /// [`Error`]: crate::Error
    failure_strategy: FailureStrategy,
}

// TODO: Make a PR with `Debug` impl for `metrics_util::registry::Registry`.
impl<S: fmt::Debug> fmt::Debug for Recorder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("storage", &self.storage)
            .field("failure_strategy", &self.failure_strategy)
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Starts building a new [`Recorder`] on top of a new [`Registry`] with
    /// the [`InsertBehavior::Merge`].
    pub fn builder() -> Builder {
        Builder {
            registry: Arc::new(
                Registry::builder()
                    .with_insert_behavior(InsertBehavior::Merge)
                    .build(),
            ),
            failure_strategy: PanicInDebugNoOpInRelease,
        }
    }
}

impl<S> Recorder<S> {
    /// Returns the [`Registry`] backing this [`Recorder`].
    ///
    /// Use it to collect the recorded metrics, or to declare [`Family`]s
    /// directly.
    ///
    /// [`Family`]: crate::Family
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        self.storage.registry()
    }
}

impl<S> metrics::Recorder for Recorder<S>
where
    S: failure::Strategy,
{
    fn describe_counter(
        &self,
        name: metrics::KeyName,
        _: Option<metrics::Unit>,
        description: metrics::SharedString,
    ) {
        self.storage
            .describe::<Counter>(name.as_str(), description.into_owned());
    }

    fn describe_gauge(
        &self,
        name: metrics::KeyName,
        _: Option<metrics::Unit>,
        description: metrics::SharedString,
    ) {
        self.storage.describe::<Gauge>(name.as_str(), description.into_owned());
    }

    fn describe_histogram(
        &self,
        name: metrics::KeyName,
        _: Option<metrics::Unit>,
        description: metrics::SharedString,
    ) {
        self.storage
            .describe::<Histogram>(name.as_str(), description.into_owned());
    }

    fn register_counter(&self, key: &metrics::Key) -> metrics::Counter {
        self.metrics
            .get_or_create_counter(key, |counter| {
                counter.as_ref().map(|c| Arc::clone(c).into()).or_else(|e| {
                    match self.failure_strategy.decide(e) {
                        failure::Action::NoOp => Ok(metrics::Counter::noop()),
                        // PANIC: We cannot panic inside this closure, because
                        //        this may lead to poisoning `RwLock`s inside
                        //        `metrics_util::registry::Registry`.
                        failure::Action::Panic => Err(e.to_string()),
                    }
                })
            })
            .unwrap_or_else(|e| {
                panic!("failed to register `{}` counter: {e}", key.name())
            })
    }

    fn register_gauge(&self, key: &metrics::Key) -> metrics::Gauge {
        self.metrics
            .get_or_create_gauge(key, |gauge| {
                gauge.as_ref().map(|g| Arc::clone(g).into()).or_else(|e| {
                    match self.failure_strategy.decide(e) {
                        failure::Action::NoOp => Ok(metrics::Gauge::noop()),
                        // PANIC: We cannot panic inside this closure, because
                        //        this may lead to poisoning `RwLock`s inside
                        //        `metrics_util::registry::Registry`.
                        failure::Action::Panic => Err(e.to_string()),
                    }
                })
            })
            .unwrap_or_else(|e| {
                panic!("failed to register `{}` gauge: {e}", key.name())
            })
    }

    fn register_histogram(&self, key: &metrics::Key) -> metrics::Histogram {
        self.metrics
            .get_or_create_histogram(key, |histogram| {
                histogram.as_ref().map(|h| Arc::clone(h).into()).or_else(|e| {
                    match self.failure_strategy.decide(e) {
                        failure::Action::NoOp => Ok(metrics::Histogram::noop()),
                        // PANIC: We cannot panic inside this closure, because
                        //        this may lead to poisoning `RwLock`s inside
                        //        `metrics_util::registry::Registry`.
                        failure::Action::Panic => Err(e.to_string()),
                    }
                })
            })
            .unwrap_or_else(|e| {
                panic!("failed to register `{}` histogram: {e}", key.name())
            })
    }
}

/// Builder for building a [`Recorder`].
#[derive(Debug)]
#[must_use]
pub struct Builder<FailureStrategy = PanicInDebugNoOpInRelease> {
    /// [`Registry`] the built [`Recorder`] registers metrics in.
    registry: Arc<Registry>,

    /// [`failure::Strategy`] of the built [`Recorder`] to apply when an
    /// [`Error`] is encountered inside its [`metrics::Recorder`] methods.
    ///
    /// [`Error`]: crate::Error
    failure_strategy: FailureStrategy,
}

impl<S> Builder<S> {
    /// Sets the provided [`Registry`] to be used by the built [`Recorder`].
    ///
    /// When not specified, a new [`Registry`] with the
    /// [`InsertBehavior::Merge`] is used.
    ///
    /// # Warning
    ///
    /// With the [`InsertBehavior::Append`], every distinct [`metrics::Key`]
    /// registers its own [`Family`], even if it shares the name with another
    /// one.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use prometheus_families::{Collectable as _, Labels, Registry};
    ///
    /// let registry = Arc::new(
    ///     Registry::builder()
    ///         .with_insert_behavior(prometheus_families::registry::InsertBehavior::Merge)
    ///         .build(),
    /// );
    /// let jobs = registry.gauge("jobs", "Queued jobs.", &Labels::new())?;
    ///
    /// prometheus_families::Recorder::builder()
    ///     .with_registry(Arc::clone(&registry))
    ///     .build_and_install();
    ///
    /// jobs.add([("queue", "fast")]).set(2.0);
    /// metrics::increment_gauge!("jobs", 3.0, "queue" => "slow");
    ///
    /// let collected = registry.collect();
    /// assert_eq!(collected.len(), 1);
    /// assert_eq!(collected[0].get_help(), "Queued jobs.");
    /// assert_eq!(collected[0].get_metric().len(), 2);
    /// # Ok::<_, prometheus_families::Error>(())
    /// ```
    ///
    /// [`Family`]: crate::Family
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the provided [`failure::Strategy`] to be used by the built
    /// [`Recorder`].
    ///
    /// The default [`failure::Strategy`] is [`PanicInDebugNoOpInRelease`]. See
    /// [`failure::strategy`] module for other available [`failure::Strategy`]s,
    /// or provide your own one by implementing the [`failure::Strategy`] trait.
    ///
    /// # Example
    ///
    /// ```rust
    /// use prometheus_families::{failure::strategy, Collectable as _};
    ///
    /// let recorder = prometheus_families::Recorder::builder()
    ///     .with_failure_strategy(strategy::NoOp)
    ///     .build_and_install();
    ///
    /// metrics::increment_counter!("invalid.name");
    ///
    /// assert_eq!(recorder.registry().collect().len(), 0);
    /// ```
    #[allow(clippy::missing_const_for_fn)] // false positive: drop
    pub fn with_failure_strategy<F>(self, strategy: F) -> Builder<F>
    where
        F: failure::Strategy,
    {
        Builder { registry: self.registry, failure_strategy: strategy }
    }

    /// Builds a [`Recorder`] out of this [`Builder`], without installing it.
    pub fn build(self) -> Recorder<S> {
        let Self { registry, failure_strategy } = self;
        let storage = storage::Storage::new(registry);
        Recorder {
            metrics: Arc::new(metrics_util::registry::Registry::new(
                storage.clone(),
            )),
            storage,
            failure_strategy,
        }
    }

    /// Builds a [`Recorder`] out of this [`Builder`] and tries to install it as
    /// [`metrics::recorder()`].
    ///
    /// # Errors
    ///
    /// If the built [`Recorder`] fails to be installed as
    /// [`metrics::recorder()`].
    pub fn try_build_and_install(
        self,
    ) -> Result<Recorder<S>, metrics::SetRecorderError>
    where
        S: failure::Strategy + Clone + Send + Sync + 'static,
    {
        let rec = self.build();
        metrics::set_boxed_recorder(Box::new(rec.clone()))?;
        tracing::debug!("installed `metrics::recorder()`");
        Ok(rec)
    }

    /// Builds a [`Recorder`] out of this [`Builder`] and installs it as
    /// [`metrics::recorder()`].
    ///
    /// # Panics
    ///
    /// If the built [`Recorder`] fails to be installed as
    /// [`metrics::recorder()`].
    pub fn build_and_install(self) -> Recorder<S>
    where
        S: failure::Strategy + Clone + Send + Sync + 'static,
    {
        self.try_build_and_install().unwrap_or_else(|e| {
            panic!(
                "failed to install `prometheus_families::Recorder` as \
                 `metrics::recorder()`: {e}",
            )
        })
    }
}
