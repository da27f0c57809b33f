//! Per-identity windowed state of reported metrics.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::identity::MetricIdentity;

mod meter;

pub use self::meter::{
    GaugeSource, MeterKind, MeterSnapshot, MeterValue, TimerSnapshot, TimerWindow,
};
use self::meter::{Meter, validate};

/// Any error that may occur during aggregation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AggregateMetricsError {
    /// An identity was reported with a kind other than the one it was first seen with.
    #[error("found incompatible metric types: existing {existing}, observed {observed}")]
    InvalidTypes {
        /// The kind of the existing meter.
        existing: MeterKind,
        /// The kind of the rejected observation.
        observed: MeterKind,
    },
    /// The value is not finite, or negative for a kind that only counts upwards.
    #[error("invalid value {value} for {kind}")]
    InvalidValue {
        /// The kind of the rejected observation.
        kind: MeterKind,
        /// The rejected value.
        value: f64,
    },
}

/// Accumulates observations of all metric identities between flushes.
///
/// State is keyed by the identity reported by the application, before any relabeling. Each
/// identity has its own lock, so observations of different identities never contend and a flush
/// captures and resets one identity at a time.
#[derive(Debug, Default)]
pub struct Aggregator {
    meters: RwLock<HashMap<MetricIdentity, Arc<Mutex<Meter>>>>,
}

impl Aggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no metric has been reported yet.
    pub fn is_empty(&self) -> bool {
        self.meters.read().is_empty()
    }

    /// Folds a value into the current window of `identity`.
    ///
    /// The first observation fixes the kind of the identity. Later observations with a different
    /// kind are rejected and leave the state untouched. Timer values are durations in
    /// milliseconds.
    pub fn observe(
        &self,
        identity: &MetricIdentity,
        kind: MeterKind,
        value: f64,
    ) -> Result<(), AggregateMetricsError> {
        validate(kind, value)?;
        let meter = self.get_or_insert(identity, || Meter::new(kind));
        meter.lock().observe(kind, value)
    }

    /// Registers a gauge whose value is sampled by calling `f` at flush time.
    ///
    /// Registering again for the same identity replaces the callback.
    pub fn register_gauge<F>(
        &self,
        identity: &MetricIdentity,
        f: F,
    ) -> Result<(), AggregateMetricsError>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let source = GaugeSource::Callback(Arc::new(f));
        let meter = self.get_or_insert(identity, || Meter::gauge(source.clone()));
        meter.lock().set_source(source)
    }

    /// Captures the state of every identity and starts a new window.
    ///
    /// Counters and timers are reset, gauges keep their value. Gauge callbacks are sampled and
    /// timer samples sorted after the identity's lock is released. Entries are returned ordered by
    /// identity.
    pub fn flush_and_reset(&self) -> Vec<(MetricIdentity, MeterSnapshot)> {
        let meters: Vec<_> = self
            .meters
            .read()
            .iter()
            .map(|(identity, meter)| (identity.clone(), Arc::clone(meter)))
            .collect();

        let mut snapshots: Vec<_> = meters
            .into_iter()
            .map(|(identity, meter)| {
                let (kind, state) = {
                    let mut meter = meter.lock();
                    (meter.kind(), meter.flush())
                };

                let value = state.into_value();
                (identity, MeterSnapshot { kind, value })
            })
            .collect();

        snapshots.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        snapshots
    }

    fn get_or_insert(
        &self,
        identity: &MetricIdentity,
        create: impl FnOnce() -> Meter,
    ) -> Arc<Mutex<Meter>> {
        if let Some(meter) = self.meters.read().get(identity) {
            return Arc::clone(meter);
        }

        let mut meters = self.meters.write();
        let meter = meters
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(create())));
        Arc::clone(meter)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use similar_asserts::assert_eq;

    use super::*;

    fn counter_total(snapshots: &[(MetricIdentity, MeterSnapshot)]) -> f64 {
        match &snapshots[0].1.value {
            MeterValue::Counter(total) => *total,
            other => panic!("expected counter, got {other:?}"),
        }
    }

    #[test]
    fn test_counter_resets_every_step() {
        let aggregator = Aggregator::new();
        let identity = MetricIdentity::new("http.requests");

        for _ in 0..5 {
            aggregator
                .observe(&identity, MeterKind::Counter, 3.0)
                .unwrap();
        }

        assert_eq!(counter_total(&aggregator.flush_and_reset()), 15.0);
        assert_eq!(counter_total(&aggregator.flush_and_reset()), 0.0);
    }

    #[test]
    fn test_gauge_not_reset() {
        let aggregator = Aggregator::new();
        let identity = MetricIdentity::new("jvm.threads.live");

        aggregator.observe(&identity, MeterKind::Gauge, 4.0).unwrap();
        aggregator.observe(&identity, MeterKind::Gauge, 7.5).unwrap();

        for _ in 0..2 {
            let snapshots = aggregator.flush_and_reset();
            assert_eq!(
                snapshots,
                vec![(
                    identity.clone(),
                    MeterSnapshot {
                        kind: MeterKind::Gauge,
                        value: MeterValue::Gauge(7.5),
                    }
                )]
            );
        }
    }

    #[test]
    fn test_timer_window() {
        let aggregator = Aggregator::new();
        let identity = MetricIdentity::new("http.latency");

        for i in 1..=10 {
            aggregator
                .observe(&identity, MeterKind::Timer, f64::from(i) * 10.0)
                .unwrap();
        }

        let snapshots = aggregator.flush_and_reset();
        let MeterValue::Timer(snapshot) = &snapshots[0].1.value else {
            panic!("expected timer");
        };
        assert_eq!(snapshot.count, 10);
        assert_eq!(snapshot.max, 100.0);

        let snapshots = aggregator.flush_and_reset();
        let MeterValue::Timer(snapshot) = &snapshots[0].1.value else {
            panic!("expected timer");
        };
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_kind_mismatch_leaves_state() {
        let aggregator = Aggregator::new();
        let identity = MetricIdentity::new("http.requests");

        aggregator
            .observe(&identity, MeterKind::Counter, 2.0)
            .unwrap();

        assert_eq!(
            aggregator.observe(&identity, MeterKind::Timer, 1.0),
            Err(AggregateMetricsError::InvalidTypes {
                existing: MeterKind::Counter,
                observed: MeterKind::Timer,
            })
        );
        assert_eq!(counter_total(&aggregator.flush_and_reset()), 2.0);
    }

    #[test]
    fn test_negative_counter_rejected() {
        let aggregator = Aggregator::new();
        let identity = MetricIdentity::new("http.requests");

        aggregator
            .observe(&identity, MeterKind::Counter, 2.0)
            .unwrap();
        assert!(
            aggregator
                .observe(&identity, MeterKind::Counter, -5.0)
                .is_err()
        );
        assert_eq!(counter_total(&aggregator.flush_and_reset()), 2.0);
    }

    #[test]
    fn test_register_gauge_sampled_at_flush() {
        let aggregator = Aggregator::new();
        let identity = MetricIdentity::new("queue.size");
        let size = Arc::new(AtomicU64::new(3));

        let sampled = Arc::clone(&size);
        aggregator
            .register_gauge(&identity, move || sampled.load(Ordering::Relaxed) as f64)
            .unwrap();

        size.store(42, Ordering::Relaxed);
        let snapshots = aggregator.flush_and_reset();
        assert_eq!(snapshots[0].1.value, MeterValue::Gauge(42.0));
    }

    #[test]
    fn test_register_gauge_on_counter() {
        let aggregator = Aggregator::new();
        let identity = MetricIdentity::new("http.requests");

        aggregator
            .observe(&identity, MeterKind::Counter, 1.0)
            .unwrap();
        assert!(aggregator.register_gauge(&identity, || 1.0).is_err());
    }

    #[test]
    fn test_identities_are_distinct_by_tags() {
        let aggregator = Aggregator::new();
        let get = MetricIdentity::new("http.requests").with_tag("method", "GET");
        let post = MetricIdentity::new("http.requests").with_tag("method", "POST");

        aggregator.observe(&get, MeterKind::Counter, 1.0).unwrap();
        aggregator.observe(&post, MeterKind::Counter, 1.0).unwrap();

        assert!(!aggregator.is_empty());
        let identities: Vec<_> = aggregator
            .flush_and_reset()
            .into_iter()
            .map(|(identity, _)| identity)
            .collect();
        assert_eq!(identities, vec![get, post]);
    }

    #[test]
    fn test_concurrent_observe_and_flush() {
        let aggregator = Arc::new(Aggregator::new());
        let identity = MetricIdentity::new("http.requests");

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let aggregator = Arc::clone(&aggregator);
                let identity = identity.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        aggregator
                            .observe(&identity, MeterKind::Counter, 1.0)
                            .unwrap();
                    }
                })
            })
            .collect();

        let mut total = 0.0;
        for _ in 0..10 {
            let snapshots = aggregator.flush_and_reset();
            if let Some((_, snapshot)) = snapshots.first() {
                total += match snapshot.value {
                    MeterValue::Counter(value) => value,
                    _ => 0.0,
                };
            }
        }

        for thread in threads {
            thread.join().unwrap();
        }
        total += counter_total(&aggregator.flush_and_reset());

        // Every increment lands in exactly one window.
        assert_eq!(total, 4000.0);
    }
}
