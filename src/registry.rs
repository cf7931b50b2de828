//! [`Registry`] of metric [`Family`]s.

use std::ptr::NonNull;

use parking_lot::Mutex;
use prometheus::proto;
use sealed::sealed;

use crate::{
    error::{Error, Result},
    metric::{Counter, Gauge, Histogram, Kind, Metric, Summary},
    Collectable, Family, Labels,
};

/// Append-only [`Collection`] of [`Family`]s of a single [`Kind`], stored in
/// a [`Registry`].
///
/// Every [`Family`] is boxed, so its address stays the same while the
/// [`Collection`] grows.
pub type Collection<M> = Vec<Box<Family<M>>>;

/// Behavior of a [`Registry`] when a [`Family`] of the same [`Kind`] is
/// registered under an already taken name.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum InsertBehavior {
    /// Always create a new [`Family`] and append it, so each registration is
    /// reported separately.
    #[default]
    Append,

    /// Reuse the existing [`Family`] having the same name and constant
    /// labels, if any.
    Merge,
}

/// Thread-safe catalog of metric [`Family`]s, producing their snapshots on
/// collection.
///
/// A metric name is bound to a single [`Kind`] for the whole lifetime of a
/// [`Registry`]: registering a [`Family`] of another [`Kind`] under it fails
/// with an [`Error::TypeConflict`]. Registering the same name and constant
/// labels again is governed by the [`InsertBehavior`] of the [`Registry`].
///
/// [`Family`]s are never removed, so the returned references stay valid for
/// the whole lifetime of the [`Registry`].
///
/// # Example
///
/// ```rust
/// use prometheus_families::{
///     registry::InsertBehavior, Collectable as _, Error, Labels, Registry,
/// };
///
/// let registry = Registry::builder()
///     .with_insert_behavior(InsertBehavior::Merge)
///     .build();
///
/// let requests = registry.counter("requests", "Served requests.", &Labels::new())?;
/// requests.add([("method", "GET")]).inc();
///
/// // Same name and labels are merged into the existing family.
/// let again = registry.counter("requests", "Ignored help.", &Labels::new())?;
/// again.add([("method", "POST")]).inc_by(2.0);
///
/// // While the name cannot be reused by another kind.
/// assert!(matches!(
///     registry.gauge("requests", "In-flight requests.", &Labels::new()),
///     Err(Error::TypeConflict { .. }),
/// ));
///
/// let report = prometheus::TextEncoder::new()
///     .encode_to_string(&registry.collect())?;
/// assert_eq!(
///     report.trim(),
///     r#"
/// ## HELP requests Served requests.
/// ## TYPE requests counter
/// requests{method="GET"} 1
/// requests{method="POST"} 2
///     "#
///     .trim(),
/// );
/// # Ok::<_, Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    /// [`InsertBehavior`] of this [`Registry`].
    insert_behavior: InsertBehavior,

    /// All the [`Family`]s registered in this [`Registry`].
    ///
    /// A single lock guards every [`Collection`], so the type uniqueness check
    /// always sees a consistent view of all the [`Kind`]s.
    catalog: Mutex<Catalog>,
}

impl Registry {
    /// Creates a new empty [`Registry`] with the [`InsertBehavior::Append`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts building a new [`Registry`].
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns the [`InsertBehavior`] of this [`Registry`].
    #[must_use]
    pub const fn insert_behavior(&self) -> InsertBehavior {
        self.insert_behavior
    }

    /// Returns the [`Counter`] [`Family`] registered under the provided
    /// `name` and constant `labels`, creating it if needed.
    ///
    /// # Errors
    ///
    /// If the `name` is already taken by another [`Kind`].
    pub fn counter(
        &self,
        name: &str,
        help: &str,
        labels: &Labels,
    ) -> Result<&Family<Counter>> {
        self.family(name, help, labels)
    }

    /// Returns the [`Gauge`] [`Family`] registered under the provided `name`
    /// and constant `labels`, creating it if needed.
    ///
    /// # Errors
    ///
    /// If the `name` is already taken by another [`Kind`].
    pub fn gauge(
        &self,
        name: &str,
        help: &str,
        labels: &Labels,
    ) -> Result<&Family<Gauge>> {
        self.family(name, help, labels)
    }

    /// Returns the [`Histogram`] [`Family`] registered under the provided
    /// `name` and constant `labels`, creating it if needed.
    ///
    /// # Errors
    ///
    /// If the `name` is already taken by another [`Kind`].
    pub fn histogram(
        &self,
        name: &str,
        help: &str,
        labels: &Labels,
    ) -> Result<&Family<Histogram>> {
        self.family(name, help, labels)
    }

    /// Returns the [`Summary`] [`Family`] registered under the provided
    /// `name` and constant `labels`, creating it if needed.
    ///
    /// # Errors
    ///
    /// If the `name` is already taken by another [`Kind`].
    pub fn summary(
        &self,
        name: &str,
        help: &str,
        labels: &Labels,
    ) -> Result<&Family<Summary>> {
        self.family(name, help, labels)
    }

    /// Returns the `M`etric [`Family`] registered under the provided `name`
    /// and constant `labels`, creating it if needed.
    ///
    /// With the [`InsertBehavior::Merge`] the first [`Family`] having exactly
    /// the same `name` and `labels` is returned (keeping its original `help`),
    /// while with the [`InsertBehavior::Append`] a new [`Family`] is always
    /// created.
    ///
    /// # Errors
    ///
    /// With an [`Error::TypeConflict`] if the `name` is already taken by a
    /// [`Family`] of another [`Kind`], regardless of the [`InsertBehavior`].
    pub fn family<M>(
        &self,
        name: &str,
        help: &str,
        labels: &Labels,
    ) -> Result<&Family<M>>
    where
        M: Metric,
        Catalog: Get<Collection<M>>,
    {
        let family = {
            let mut catalog = self.catalog.lock();

            if let Some(existing) = catalog.conflicting_kind(name, M::KIND) {
                tracing::warn!(
                    name,
                    %existing,
                    requested = %M::KIND,
                    "metric family already exists with different type",
                );
                return Err(Error::TypeConflict {
                    name: name.into(),
                    existing,
                    requested: M::KIND,
                });
            }

            let families = Get::<Collection<M>>::collection_mut(&mut *catalog);
            let merged = match self.insert_behavior {
                InsertBehavior::Merge => families.iter().position(|f| {
                    f.name() == name && f.constant_labels() == labels
                }),
                InsertBehavior::Append => None,
            };
            let idx = if let Some(idx) = merged {
                tracing::debug!(name, kind = %M::KIND, "merged metric family");
                idx
            } else {
                families
                    .push(Box::new(Family::new(name, help, labels.clone())));
                tracing::debug!(
                    name,
                    kind = %M::KIND,
                    total = families.len(),
                    "registered metric family",
                );
                families.len() - 1
            };
            // Derived from the stored `Box` only: moving a `Box` invalidates
            // pointers taken from it earlier.
            NonNull::from(&*families[idx])
        };

        // SAFETY: `Family`s are boxed and never removed from their
        //         `Collection`, so the pointee stays alive and in place until
        //         the `Catalog` is dropped along with this `Registry`, which
        //         is borrowed for the lifetime of the returned reference.
        Ok(unsafe { family.as_ref() })
    }

    /// Looks up the first `M`etric [`Family`] registered under the provided
    /// `name` and constant `labels`, without creating it.
    #[must_use]
    pub fn find<M>(&self, name: &str, labels: &Labels) -> Option<&Family<M>>
    where
        M: Metric,
        Catalog: Get<Collection<M>>,
    {
        let family = {
            let catalog = self.catalog.lock();
            Get::<Collection<M>>::collection(&*catalog)
                .iter()
                .find(|f| f.name() == name && f.constant_labels() == labels)
                .map(|f| NonNull::from(&**f))?
        };

        // SAFETY: Same as in `Registry::family()`.
        Some(unsafe { family.as_ref() })
    }
}

impl Collectable for Registry {
    /// Collects snapshots of all the registered [`Family`]s: [`Counter`]s,
    /// then [`Gauge`]s, then [`Histogram`]s, then [`Summary`]s, each in their
    /// registration order.
    fn collect(&self) -> Vec<proto::MetricFamily> {
        fn collect_all<M: Metric>(
            out: &mut Vec<proto::MetricFamily>,
            families: &Collection<M>,
        ) {
            for family in families {
                out.extend(family.collect());
            }
        }

        let catalog = self.catalog.lock();

        let mut out = Vec::new();
        collect_all(&mut out, &catalog.counters);
        collect_all(&mut out, &catalog.gauges);
        collect_all(&mut out, &catalog.histograms);
        collect_all(&mut out, &catalog.summaries);

        tracing::debug!(families = out.len(), "collected metric families");
        out
    }
}

/// Builder for building a [`Registry`].
#[derive(Clone, Copy, Debug, Default)]
#[must_use]
pub struct Builder {
    /// [`InsertBehavior`] of the built [`Registry`].
    insert_behavior: InsertBehavior,
}

impl Builder {
    /// Sets the [`InsertBehavior`] of the built [`Registry`].
    ///
    /// When not specified, the [`InsertBehavior::Append`] is used.
    pub const fn with_insert_behavior(
        mut self,
        behavior: InsertBehavior,
    ) -> Self {
        self.insert_behavior = behavior;
        self
    }

    /// Builds a new empty [`Registry`] out of this [`Builder`].
    #[must_use]
    pub fn build(self) -> Registry {
        Registry {
            insert_behavior: self.insert_behavior,
            catalog: Mutex::default(),
        }
    }
}

/// [`Collection`]s of every [`Kind`] stored in a [`Registry`].
#[derive(Debug, Default)]
pub struct Catalog {
    /// [`Collection`] of [`Counter`] [`Family`]s.
    counters: Collection<Counter>,

    /// [`Collection`] of [`Gauge`] [`Family`]s.
    gauges: Collection<Gauge>,

    /// [`Collection`] of [`Histogram`] [`Family`]s.
    histograms: Collection<Histogram>,

    /// [`Collection`] of [`Summary`] [`Family`]s.
    summaries: Collection<Summary>,
}

impl Catalog {
    /// Returns the [`Kind`] other than the `requested` one having a [`Family`]
    /// with the provided `name`, if any.
    fn conflicting_kind(&self, name: &str, requested: Kind) -> Option<Kind> {
        fn contains<M>(families: &Collection<M>, name: &str) -> bool {
            families.iter().any(|f| f.name() == name)
        }

        Kind::ALL.into_iter().filter(|k| *k != requested).find(|k| match k {
            Kind::Counter => contains(&self.counters, name),
            Kind::Gauge => contains(&self.gauges, name),
            Kind::Histogram => contains(&self.histograms, name),
            Kind::Summary => contains(&self.summaries, name),
        })
    }
}

/// Retrieving a `Collection` of [`Family`]s from a [`Catalog`].
#[sealed]
pub trait Get<Collection> {
    /// Returns the `Collection` stored in this [`Catalog`].
    #[must_use]
    fn collection(&self) -> &Collection;

    /// Returns the mutable `Collection` stored in this [`Catalog`].
    #[must_use]
    fn collection_mut(&mut self) -> &mut Collection;
}

#[sealed]
impl Get<Collection<Counter>> for Catalog {
    fn collection(&self) -> &Collection<Counter> {
        &self.counters
    }

    fn collection_mut(&mut self) -> &mut Collection<Counter> {
        &mut self.counters
    }
}

#[sealed]
impl Get<Collection<Gauge>> for Catalog {
    fn collection(&self) -> &Collection<Gauge> {
        &self.gauges
    }

    fn collection_mut(&mut self) -> &mut Collection<Gauge> {
        &mut self.gauges
    }
}

#[sealed]
impl Get<Collection<Histogram>> for Catalog {
    fn collection(&self) -> &Collection<Histogram> {
        &self.histograms
    }

    fn collection_mut(&mut self) -> &mut Collection<Histogram> {
        &mut self.histograms
    }
}

#[sealed]
impl Get<Collection<Summary>> for Catalog {
    fn collection(&self) -> &Collection<Summary> {
        &self.summaries
    }

    fn collection_mut(&mut self) -> &mut Collection<Summary> {
        &mut self.summaries
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use crate::{
        metric::{Counter, Histogram, Kind, Summary},
        Collectable as _, Error, Labels,
    };

    use super::{InsertBehavior, Registry};

    fn merging() -> Registry {
        Registry::builder()
            .with_insert_behavior(InsertBehavior::Merge)
            .build()
    }

    fn labels<const N: usize>(pairs: [(&str, &str); N]) -> Labels {
        pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }

    fn names(registry: &Registry) -> Vec<String> {
        registry.collect().iter().map(|mf| mf.get_name().to_owned()).collect()
    }

    #[test]
    fn appends_by_default() {
        assert_eq!(Registry::new().insert_behavior(), InsertBehavior::Append);
        assert_eq!(
            Registry::builder().build().insert_behavior(),
            InsertBehavior::Append,
        );
        assert_eq!(merging().insert_behavior(), InsertBehavior::Merge);
    }

    #[test]
    fn collects_single_family() {
        let registry = Registry::new();
        let family = registry.counter("test", "a test", &Labels::new()).unwrap();
        family.add([("name", "counter1")]);
        family.add([("name", "counter2")]);

        let collected = registry.collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].get_name(), "test");
        assert_eq!(collected[0].get_help(), "a test");

        let metrics = collected[0].get_metric();
        assert_eq!(metrics.len(), 2);
        for metric in metrics {
            assert_eq!(metric.get_label().len(), 1);
            assert_eq!(metric.get_label()[0].get_name(), "name");
        }
    }

    #[test]
    fn collects_histogram_family() {
        let registry = Registry::new();
        let family = registry.histogram("hist", "Test Histogram", &Labels::new());

        family
            .unwrap()
            .add_with([("name", "test_histogram_1")], || {
                Histogram::new([0.0, 1.0, 2.0])
            })
            .observe(1.1);

        let collected = registry.collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].get_field_type(), Kind::Histogram.metric_type());
    }

    #[test]
    fn rejects_name_of_another_kind() {
        for first in Kind::ALL {
            let registry = Registry::new();
            register(&registry, first, "same_name").unwrap();

            for other in Kind::ALL.into_iter().filter(|k| *k != first) {
                assert_eq!(
                    register(&registry, other, "same_name"),
                    Err(Error::TypeConflict {
                        name: "same_name".into(),
                        existing: first,
                        requested: other,
                    }),
                );
            }
            assert_eq!(registry.collect().len(), 1);
        }
    }

    #[test]
    fn type_conflict_ignores_labels_and_behavior() {
        let registry = merging();
        registry.counter("x", "h", &labels([("a", "1")])).unwrap();

        assert!(matches!(
            registry.gauge("x", "h", &labels([("a", "2")])),
            Err(Error::TypeConflict { existing: Kind::Counter, .. }),
        ));
    }

    #[test]
    fn conflict_keeps_only_first_kind() {
        let registry = Registry::new();
        registry.counter("x", "h", &Labels::new()).unwrap();
        assert!(registry.gauge("x", "h", &Labels::new()).is_err());

        let collected = registry.collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].get_name(), "x");
        assert_eq!(collected[0].get_field_type(), Kind::Counter.metric_type());
    }

    #[test]
    fn appends_same_families() {
        let registry = Registry::new();
        for _ in 0..4 {
            registry
                .counter("counter", "Test Counter", &Labels::new())
                .unwrap()
                .add([("name", "test_counter")]);
        }

        assert_eq!(registry.collect().len(), 4);
    }

    #[test]
    fn appends_empty_families() {
        let registry = Registry::new();
        for _ in 0..4 {
            let _ = registry.counter("c", "h", &Labels::new()).unwrap();
        }

        let collected = registry.collect();
        assert_eq!(collected.len(), 4);
        for snapshot in &collected {
            assert_eq!(snapshot.get_name(), "c");
            assert!(snapshot.get_metric().is_empty());
        }
    }

    #[test]
    fn appended_families_keep_own_instances() {
        let registry = Registry::new();
        let first = registry.counter("c", "h", &Labels::new()).unwrap();
        let second = registry.counter("c", "h", &Labels::new()).unwrap();
        assert!(!std::ptr::eq(first, second));

        first.add([("n", "1")]).inc();
        second.add([("n", "2")]).inc_by(2.0);

        let values = registry
            .collect()
            .iter()
            .map(|mf| {
                let metric = &mf.get_metric()[0];
                (
                    metric.get_label()[0].get_value().to_owned(),
                    metric.get_counter().get_value(),
                )
            })
            .collect::<Vec<_>>();
        assert_eq!(values, [("1".to_owned(), 1.0), ("2".to_owned(), 2.0)]);
    }

    #[test]
    fn merges_same_families() {
        let registry = merging();
        for _ in 0..4 {
            registry
                .counter("counter", "Test Counter", &Labels::new())
                .unwrap()
                .add([("name", "test_counter")]);
        }

        let collected = registry.collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].get_metric().len(), 1);
    }

    #[test]
    fn merges_instances_via_different_references() {
        let registry = merging();
        let first = registry.counter("requests", "h", &Labels::new()).unwrap();
        let second = registry.counter("requests", "h", &Labels::new()).unwrap();
        assert!(std::ptr::eq(first, second));

        first.add([("method", "GET")]).inc();
        second.add([("method", "POST")]).inc();

        let collected = registry.collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].get_name(), "requests");
        let methods = collected[0]
            .get_metric()
            .iter()
            .map(|m| m.get_label()[0].get_value())
            .collect::<Vec<_>>();
        assert_eq!(methods, ["GET", "POST"]);
    }

    #[test]
    fn merge_retains_original_help() {
        let registry = merging();
        registry.gauge("g", "original", &Labels::new()).unwrap();
        let family = registry.gauge("g", "another", &Labels::new()).unwrap();

        assert_eq!(*family.help(), "original");
        assert_eq!(registry.collect()[0].get_help(), "original");
    }

    #[test]
    fn merge_distinguishes_constant_labels() {
        let registry = merging();
        let a = registry.counter("c", "h", &labels([("a", "1")])).unwrap();
        let b = registry.counter("c", "h", &labels([("a", "2")])).unwrap();
        let a_again = registry.counter("c", "h", &labels([("a", "1")])).unwrap();

        assert!(!std::ptr::eq(a, b));
        assert!(std::ptr::eq(a, a_again));
        assert_eq!(registry.collect().len(), 2);
    }

    #[test]
    fn collects_in_kind_then_insertion_order() {
        let registry = Registry::new();
        registry.summary("s1", "h", &Labels::new()).unwrap();
        registry.histogram("h1", "h", &Labels::new()).unwrap();
        registry.gauge("g1", "h", &Labels::new()).unwrap();
        registry.counter("c2", "h", &Labels::new()).unwrap();
        registry.counter("c1", "h", &Labels::new()).unwrap();
        registry.gauge("g0", "h", &Labels::new()).unwrap();

        let expected = ["c2", "c1", "g1", "g0", "h1", "s1"];
        assert_eq!(names(&registry), expected);
        assert_eq!(names(&registry), expected);
    }

    #[test]
    fn references_outlive_later_registrations() {
        let registry = Registry::new();
        let first = registry.counter("c0", "h", &Labels::new()).unwrap();
        let merged = merging();
        let kept = merged.counter("m", "h", &Labels::new()).unwrap();

        for i in 1..64 {
            let name = format!("c{i}");
            let _ = registry.counter(&name, "h", &Labels::new()).unwrap();
            let _ = merged.counter(&name, "h", &Labels::new()).unwrap();
        }
        first.add([("n", "1")]).inc();
        let again = merged.counter("m", "h", &Labels::new()).unwrap();

        assert_eq!(first.name(), "c0");
        assert_eq!(first.len(), 1);
        assert!(std::ptr::eq(kept, again));
        assert_eq!(kept.name(), "m");
        assert_eq!(registry.collect().len(), 64);
    }

    #[test]
    fn collects_nothing_when_empty() {
        let registry = Registry::new();

        assert!(registry.collect().is_empty());
        assert!(registry.collect().is_empty());
    }

    #[test]
    fn finds_without_creating() {
        let registry = Registry::new();
        assert!(registry.find::<Counter>("c", &Labels::new()).is_none());

        let family = registry.counter("c", "h", &Labels::new()).unwrap();
        let found = registry.find::<Counter>("c", &Labels::new()).unwrap();
        assert!(std::ptr::eq(family, found));
        assert!(registry.find::<Summary>("c", &Labels::new()).is_none());
        assert!(registry.find::<Counter>("c", &labels([("a", "1")])).is_none());
        assert_eq!(registry.collect().len(), 1);
    }

    #[test]
    fn concurrent_merge_creates_single_family() {
        const THREADS: usize = 8;

        let registry = merging();
        let barrier = Barrier::new(THREADS);
        thread::scope(|s| {
            for i in 0..THREADS {
                let (registry, barrier) = (&registry, &barrier);
                drop(s.spawn(move || {
                    barrier.wait();
                    let family =
                        registry.counter("hits", "h", &Labels::new()).unwrap();
                    family.add([("thread", i.to_string())]).inc();
                }));
            }
        });

        let collected = registry.collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].get_metric().len(), THREADS);
    }

    #[test]
    fn concurrent_kinds_bind_name_once() {
        let registry = Registry::new();
        let barrier = Barrier::new(Kind::ALL.len());
        let results = thread::scope(|s| {
            Kind::ALL
                .into_iter()
                .map(|kind| {
                    let (registry, barrier) = (&registry, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        register(registry, kind, "contested")
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let winner = *results.iter().find_map(|r| r.as_ref().ok()).unwrap();
        for res in &results {
            if let Err(e) = res {
                assert!(matches!(
                    e,
                    Error::TypeConflict { existing, .. } if *existing == winner,
                ));
            }
        }
        let collected = registry.collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].get_field_type(), winner.metric_type());
    }

    #[test]
    fn collects_while_registering() {
        let registry = Registry::new();
        thread::scope(|s| {
            drop(s.spawn(|| {
                for i in 0..100 {
                    registry
                        .gauge(&format!("g{i}"), "h", &Labels::new())
                        .unwrap()
                        .add(Labels::new())
                        .set(1.0);
                }
            }));
            drop(s.spawn(|| {
                let mut seen = 0;
                while seen < 100 {
                    let collected = registry.collect();
                    assert!(collected.len() >= seen);
                    seen = collected.len();
                }
            }));
        });

        assert_eq!(registry.collect().len(), 100);
    }

    /// Registers a family of the provided `kind`, returning the [`Kind`] on
    /// success.
    fn register(
        registry: &Registry,
        kind: Kind,
        name: &str,
    ) -> Result<Kind, Error> {
        let labels = Labels::new();
        match kind {
            Kind::Counter => registry.counter(name, "h", &labels).map(drop),
            Kind::Gauge => registry.gauge(name, "h", &labels).map(drop),
            Kind::Histogram => registry.histogram(name, "h", &labels).map(drop),
            Kind::Summary => registry.summary(name, "h", &labels).map(drop),
        }
        .map(|()| kind)
    }
}
