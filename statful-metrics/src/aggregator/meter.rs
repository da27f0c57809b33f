use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::aggregator::AggregateMetricsError;

/// The kind of instrument a metric was reported by.
///
/// The kind is fixed on the first observation of an identity. Every kind belongs to one of three
/// state families that decide how values are folded into the current window:
///
/// | Kind                    | Family  | Reset every step |
/// |-------------------------|---------|------------------|
/// | `Counter`               | counter | yes              |
/// | `FunctionCounter`       | counter | yes              |
/// | `Gauge`                 | gauge   | no               |
/// | `TimeGauge`             | gauge   | no               |
/// | `Timer`                 | timer   | yes              |
/// | `FunctionTimer`         | timer   | yes              |
/// | `DistributionSummary`   | timer   | yes              |
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterKind {
    /// A monotonically increasing count.
    Counter,
    /// A counter whose increments are computed by the application.
    FunctionCounter,
    /// The last observed value.
    Gauge,
    /// Durations of individual events in milliseconds.
    Timer,
    /// A timer aggregated by the application.
    FunctionTimer,
    /// A distribution of arbitrary non-negative amounts.
    DistributionSummary,
    /// A gauge measuring a duration.
    TimeGauge,
}

impl MeterKind {
    /// Returns the name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::FunctionCounter => "function_counter",
            Self::Gauge => "gauge",
            Self::Timer => "timer",
            Self::FunctionTimer => "function_timer",
            Self::DistributionSummary => "distribution_summary",
            Self::TimeGauge => "time_gauge",
        }
    }

    /// Returns `true` for kinds that only accept non-negative values.
    fn is_non_negative(&self) -> bool {
        !matches!(self, Self::Gauge | Self::TimeGauge)
    }
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the value of a gauge comes from.
#[derive(Clone)]
pub enum GaugeSource {
    /// A value pushed by the application.
    Value(f64),
    /// A callback sampled at flush time.
    Callback(Arc<dyn Fn() -> f64 + Send + Sync>),
}

impl GaugeSource {
    /// Returns the current value of the gauge.
    pub fn sample(&self) -> f64 {
        match self {
            Self::Value(value) => *value,
            Self::Callback(callback) => callback(),
        }
    }
}

impl fmt::Debug for GaugeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Callback(_) => f.debug_tuple("Callback").finish_non_exhaustive(),
        }
    }
}

/// Timer state of the current window.
#[derive(Clone, Debug, Default)]
pub struct TimerWindow {
    count: u64,
    sum: f64,
    max: f64,
    samples: SmallVec<[f64; 3]>,
}

impl TimerWindow {
    /// Records one observation.
    pub fn insert(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.max = self.max.max(value);
        self.samples.push(value);
    }

    /// Returns the number of observations in this window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Converts the window into a snapshot with sorted samples.
    ///
    /// Sorting is linearithmic in the number of observations, so call this only after the window
    /// was taken out of its meter.
    pub fn into_snapshot(self) -> TimerSnapshot {
        let mut samples = self.samples.into_vec();
        samples.sort_by(f64::total_cmp);

        TimerSnapshot {
            count: self.count,
            sum: self.sum,
            max: self.max,
            samples,
        }
    }
}

/// The captured state of a timer window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimerSnapshot {
    /// The number of observations.
    pub count: u64,
    /// The sum of all observations.
    pub sum: f64,
    /// The largest observation.
    pub max: f64,
    /// All observations, sorted in ascending order.
    pub samples: Vec<f64>,
}

impl TimerSnapshot {
    /// Returns `true` if the window had no observations.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the arithmetic mean, or `None` for an empty window.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Returns the `q` quantile using the nearest-rank method.
    ///
    /// The result is the sample at 1-based rank `ceil(q * n)`, clamped to the valid range. Returns
    /// `None` for an empty window.
    pub fn percentile(&self, q: f64) -> Option<f64> {
        let n = self.samples.len();
        if n == 0 {
            return None;
        }

        // Absorbs representation error such as 0.07 * 100 = 7.000000000000001.
        let rank = (q * n as f64 - 1e-9).ceil();
        let rank = (rank.max(1.0) as usize).min(n);
        self.samples.get(rank - 1).copied()
    }
}

/// The value of a meter captured at the end of a step.
#[derive(Clone, Debug, PartialEq)]
pub enum MeterValue {
    /// The total of a counter during the step.
    Counter(f64),
    /// The current value of a gauge.
    Gauge(f64),
    /// The timer window of the step.
    Timer(TimerSnapshot),
}

/// A meter captured at the end of a step, together with its kind.
#[derive(Clone, Debug, PartialEq)]
pub struct MeterSnapshot {
    /// The kind of the meter.
    pub kind: MeterKind,
    /// The captured value.
    pub value: MeterValue,
}

#[derive(Debug)]
enum MeterState {
    Counter(f64),
    Gauge(GaugeSource),
    Timer(TimerWindow),
}

/// Window state captured under the meter lock.
///
/// Gauge callbacks are sampled and timer samples sorted only after the lock is released.
#[derive(Debug)]
pub(crate) enum FlushedState {
    Counter(f64),
    Gauge(GaugeSource),
    Timer(TimerWindow),
}

impl FlushedState {
    pub(crate) fn into_value(self) -> MeterValue {
        match self {
            Self::Counter(total) => MeterValue::Counter(total),
            Self::Gauge(source) => MeterValue::Gauge(source.sample()),
            Self::Timer(window) => MeterValue::Timer(window.into_snapshot()),
        }
    }
}

/// The windowed state of one metric identity.
#[derive(Debug)]
pub(crate) struct Meter {
    kind: MeterKind,
    state: MeterState,
}

impl Meter {
    /// Creates an empty meter of the given kind.
    pub(crate) fn new(kind: MeterKind) -> Self {
        let state = match kind {
            MeterKind::Counter | MeterKind::FunctionCounter => MeterState::Counter(0.0),
            MeterKind::Gauge | MeterKind::TimeGauge => MeterState::Gauge(GaugeSource::Value(0.0)),
            MeterKind::Timer | MeterKind::FunctionTimer | MeterKind::DistributionSummary => {
                MeterState::Timer(TimerWindow::default())
            }
        };

        Self { kind, state }
    }

    /// Creates a gauge backed by the given source.
    pub(crate) fn gauge(source: GaugeSource) -> Self {
        Self {
            kind: MeterKind::Gauge,
            state: MeterState::Gauge(source),
        }
    }

    pub(crate) fn kind(&self) -> MeterKind {
        self.kind
    }

    /// Folds a value into the current window.
    pub(crate) fn observe(
        &mut self,
        kind: MeterKind,
        value: f64,
    ) -> Result<(), AggregateMetricsError> {
        self.check_kind(kind)?;

        match &mut self.state {
            MeterState::Counter(total) => *total += value,
            MeterState::Gauge(source) => *source = GaugeSource::Value(value),
            MeterState::Timer(window) => window.insert(value),
        }

        Ok(())
    }

    /// Replaces the source of a gauge.
    pub(crate) fn set_source(&mut self, source: GaugeSource) -> Result<(), AggregateMetricsError> {
        self.check_kind(MeterKind::Gauge)?;
        self.state = MeterState::Gauge(source);
        Ok(())
    }

    /// Captures the current window and resets window-scoped fields.
    pub(crate) fn flush(&mut self) -> FlushedState {
        match &mut self.state {
            MeterState::Counter(total) => FlushedState::Counter(std::mem::take(total)),
            MeterState::Gauge(source) => FlushedState::Gauge(source.clone()),
            MeterState::Timer(window) => FlushedState::Timer(std::mem::take(window)),
        }
    }

    fn check_kind(&self, observed: MeterKind) -> Result<(), AggregateMetricsError> {
        if self.kind != observed {
            return Err(AggregateMetricsError::InvalidTypes {
                existing: self.kind,
                observed,
            });
        }
        Ok(())
    }
}

/// Rejects values that cannot be folded into a meter of the given kind.
pub(crate) fn validate(kind: MeterKind, value: f64) -> Result<(), AggregateMetricsError> {
    if !value.is_finite() || (kind.is_non_negative() && value < 0.0) {
        return Err(AggregateMetricsError::InvalidValue { kind, value });
    }
    Ok(())
}
