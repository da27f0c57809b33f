//! Conversion of end-of-step meter state into outbound points.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregator::{MeterKind, MeterSnapshot, MeterValue, TimerSnapshot};
use crate::identity::{MetricIdentity, Tags};
use crate::time::UnixTimestamp;

/// The aggregation frequency in seconds attached to every timer point.
///
/// This is fixed and independent of the configured step.
pub const TIMER_AGGREGATION_FREQUENCY: u32 = 10;

/// A facet of a timer window.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// The number of observations.
    Count,
    /// The mean of all observations.
    Avg,
    /// The largest observation.
    Max,
    /// The 90th percentile.
    P90,
    /// The 95th percentile.
    P95,
    /// The 99th percentile.
    P99,
}

impl Aggregation {
    /// Returns the wire name of this aggregation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Avg => "avg",
            Self::Max => "max",
            Self::P90 => "p90",
            Self::P95 => "p95",
            Self::P99 => "p99",
        }
    }

    /// Maps a percentile fraction to its aggregation.
    ///
    /// The fraction is scaled to a whole percent by truncation, so `0.999` maps to `P99`. Returns
    /// `None` for percentiles that have no aggregation.
    pub fn from_percentile(percentile: f64) -> Option<Self> {
        match (percentile * 100.0) as u32 {
            90 => Some(Self::P90),
            95 => Some(Self::P95),
            99 => Some(Self::P99),
            _ => None,
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The type of an outbound point.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointKind {
    /// A counter total.
    Counter,
    /// A gauge value.
    Gauge,
    /// One facet of a timer window.
    AggregatedTimer {
        /// The facet.
        aggregation: Aggregation,
        /// The aggregation frequency in seconds.
        frequency: u32,
    },
}

/// The value of an outbound point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PointValue {
    /// Counters and timer facets.
    Integer(i64),
    /// Gauges.
    Float(f64),
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => value.fmt(f),
            Self::Float(value) => value.fmt(f),
        }
    }
}

/// A single data point ready to be handed to a transport.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutboundPoint {
    /// The published metric name.
    pub name: String,
    /// The published tags.
    pub tags: Tags,
    /// The value.
    pub value: PointValue,
    /// The type, including the aggregation of timer facets.
    pub kind: PointKind,
    /// The time of the flush that produced this point.
    pub timestamp: UnixTimestamp,
}

/// Converts meter snapshots into outbound points.
#[derive(Clone, Debug)]
pub struct Translator {
    /// Percentile aggregations with the configured quantile they are computed from.
    percentiles: Vec<(Aggregation, f64)>,
}

impl Translator {
    /// Creates a translator emitting the given timer percentiles.
    ///
    /// Each percentile is computed as configured and published under its truncated
    /// [`Aggregation`], so `0.999` is reported as `p99`. Percentiles without a matching
    /// aggregation are dropped. When several percentiles map to the same aggregation, the first
    /// one is used.
    pub fn new(percentiles: &[f64]) -> Self {
        let mut pairs: Vec<(Aggregation, f64)> = Vec::with_capacity(percentiles.len());
        for &quantile in percentiles {
            let Some(aggregation) = Aggregation::from_percentile(quantile) else {
                continue;
            };
            if !pairs.iter().any(|(existing, _)| *existing == aggregation) {
                pairs.push((aggregation, quantile));
            }
        }

        Self { percentiles: pairs }
    }

    /// Converts the snapshot of one metric into zero or more points.
    ///
    /// `identity` is the already relabeled identity the points are published under.
    pub fn translate(
        &self,
        identity: &MetricIdentity,
        snapshot: &MeterSnapshot,
        timestamp: UnixTimestamp,
    ) -> Vec<OutboundPoint> {
        let tags = sanitize_tags(&identity.tags);
        let point = |kind: PointKind, value: PointValue| OutboundPoint {
            name: identity.name.clone(),
            tags: tags.clone(),
            value,
            kind,
            timestamp,
        };

        match (snapshot.kind, &snapshot.value) {
            (MeterKind::Counter | MeterKind::FunctionCounter, MeterValue::Counter(total)) => {
                vec![point(PointKind::Counter, PointValue::Integer(*total as i64))]
            }
            (MeterKind::Gauge, MeterValue::Gauge(value)) => {
                vec![point(PointKind::Gauge, PointValue::Float(*value))]
            }
            (MeterKind::Timer, MeterValue::Timer(timer)) => self
                .timer_values(timer)
                .map(|(aggregation, value)| {
                    let kind = PointKind::AggregatedTimer {
                        aggregation,
                        frequency: TIMER_AGGREGATION_FREQUENCY,
                    };
                    point(kind, PointValue::Integer(value as i64))
                })
                .collect(),
            (kind, _) => {
                statful_log::trace!(
                    metric = identity.name.as_str(),
                    kind = kind.as_str(),
                    "skipping unsupported meter"
                );
                Vec::new()
            }
        }
    }

    /// Returns the facets of a timer window, in emission order.
    fn timer_values<'a>(
        &'a self,
        timer: &'a TimerSnapshot,
    ) -> impl Iterator<Item = (Aggregation, f64)> + 'a {
        let summary = timer.mean().map(|mean| {
            [
                (Aggregation::Count, timer.count as f64),
                (Aggregation::Avg, mean),
                (Aggregation::Max, timer.max),
            ]
        });

        let percentiles = self.percentiles.iter().filter_map(|&(aggregation, quantile)| {
            Some((aggregation, timer.percentile(quantile)?))
        });

        summary.into_iter().flatten().chain(percentiles)
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(&[0.9, 0.95, 0.99])
    }
}

/// Replaces spaces in tag values, which the backend does not accept.
fn sanitize_tags(tags: &Tags) -> Tags {
    tags.iter()
        .map(|(key, value)| (key.clone(), value.replace(' ', "_")))
        .collect()
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use crate::aggregator::TimerWindow;

    use super::*;

    fn timestamp() -> UnixTimestamp {
        UnixTimestamp::from_secs(1_700_000_000)
    }

    fn timer(values: impl IntoIterator<Item = f64>) -> MeterSnapshot {
        let mut window = TimerWindow::default();
        for value in values {
            window.insert(value);
        }
        MeterSnapshot {
            kind: MeterKind::Timer,
            value: MeterValue::Timer(window.into_snapshot()),
        }
    }

    #[test]
    fn test_from_percentile() {
        assert_eq!(Aggregation::from_percentile(0.9), Some(Aggregation::P90));
        assert_eq!(Aggregation::from_percentile(0.95), Some(Aggregation::P95));
        assert_eq!(Aggregation::from_percentile(0.99), Some(Aggregation::P99));
        assert_eq!(Aggregation::from_percentile(0.999), Some(Aggregation::P99));
        assert_eq!(Aggregation::from_percentile(0.5), None);
        assert_eq!(Aggregation::from_percentile(0.75), None);
    }

    #[test]
    fn test_counter_truncated() {
        let snapshot = MeterSnapshot {
            kind: MeterKind::FunctionCounter,
            value: MeterValue::Counter(7.9),
        };
        let points =
            Translator::default().translate(&MetricIdentity::new("jobs"), &snapshot, timestamp());

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].kind, PointKind::Counter);
        assert_eq!(points[0].value, PointValue::Integer(7));
    }

    #[test]
    fn test_gauge_unmodified() {
        let snapshot = MeterSnapshot {
            kind: MeterKind::Gauge,
            value: MeterValue::Gauge(0.75),
        };
        let points =
            Translator::default().translate(&MetricIdentity::new("load"), &snapshot, timestamp());

        assert_eq!(points[0].value, PointValue::Float(0.75));
    }

    #[test]
    fn test_timer_points() {
        let points = Translator::default().translate(
            &MetricIdentity::new("http.latency").with_tag("uri", "/api"),
            &timer((1..=10).map(|i| f64::from(i) * 10.0)),
            timestamp(),
        );

        insta::assert_json_snapshot!(points, @r###"
        [
          {
            "name": "http.latency",
            "tags": {
              "uri": "/api"
            },
            "value": 10,
            "kind": {
              "type": "aggregated_timer",
              "aggregation": "count",
              "frequency": 10
            },
            "timestamp": 1700000000
          },
          {
            "name": "http.latency",
            "tags": {
              "uri": "/api"
            },
            "value": 55,
            "kind": {
              "type": "aggregated_timer",
              "aggregation": "avg",
              "frequency": 10
            },
            "timestamp": 1700000000
          },
          {
            "name": "http.latency",
            "tags": {
              "uri": "/api"
            },
            "value": 100,
            "kind": {
              "type": "aggregated_timer",
              "aggregation": "max",
              "frequency": 10
            },
            "timestamp": 1700000000
          },
          {
            "name": "http.latency",
            "tags": {
              "uri": "/api"
            },
            "value": 90,
            "kind": {
              "type": "aggregated_timer",
              "aggregation": "p90",
              "frequency": 10
            },
            "timestamp": 1700000000
          },
          {
            "name": "http.latency",
            "tags": {
              "uri": "/api"
            },
            "value": 100,
            "kind": {
              "type": "aggregated_timer",
              "aggregation": "p95",
              "frequency": 10
            },
            "timestamp": 1700000000
          },
          {
            "name": "http.latency",
            "tags": {
              "uri": "/api"
            },
            "value": 100,
            "kind": {
              "type": "aggregated_timer",
              "aggregation": "p99",
              "frequency": 10
            },
            "timestamp": 1700000000
          }
        ]
        "###);
    }

    #[test]
    fn test_timer_mean_truncated() {
        let points = Translator::new(&[]).translate(
            &MetricIdentity::new("t"),
            &timer([1.0, 2.0, 2.0, 2.9]),
            timestamp(),
        );

        let values: Vec<_> = points.iter().map(|p| p.value).collect();
        assert_eq!(
            values,
            vec![
                PointValue::Integer(4),
                PointValue::Integer(1),
                PointValue::Integer(2),
            ]
        );
    }

    #[test]
    fn test_unsupported_percentiles_skipped() {
        let translator = Translator::new(&[0.5, 0.99, 0.99, 0.75]);

        let points = translator.translate(&MetricIdentity::new("t"), &timer([1.0]), timestamp());
        assert_eq!(points.len(), 4);
        assert_eq!(
            points[3].kind,
            PointKind::AggregatedTimer {
                aggregation: Aggregation::P99,
                frequency: TIMER_AGGREGATION_FREQUENCY,
            }
        );
    }

    #[test]
    fn test_percentile_computed_as_configured() {
        let snapshot = timer((1..=1000).map(f64::from));
        let identity = MetricIdentity::new("t");

        let points = Translator::new(&[0.999]).translate(&identity, &snapshot, timestamp());
        let p99 = points.last().unwrap();
        assert_eq!(
            p99.kind,
            PointKind::AggregatedTimer {
                aggregation: Aggregation::P99,
                frequency: TIMER_AGGREGATION_FREQUENCY,
            }
        );
        assert_eq!(p99.value, PointValue::Integer(999));

        // The first percentile mapping to an aggregation wins.
        let points = Translator::new(&[0.99, 0.999]).translate(&identity, &snapshot, timestamp());
        assert_eq!(points.len(), 4);
        assert_eq!(points[3].value, PointValue::Integer(990));
    }

    #[test]
    fn test_empty_timer_emits_nothing() {
        let points = Translator::default().translate(
            &MetricIdentity::new("t"),
            &timer(std::iter::empty()),
            timestamp(),
        );
        assert!(points.is_empty());
    }

    #[test]
    fn test_preaggregated_kinds_skipped() {
        let translator = Translator::default();
        let identity = MetricIdentity::new("t");

        for kind in [MeterKind::FunctionTimer, MeterKind::DistributionSummary] {
            let mut snapshot = timer([1.0]);
            snapshot.kind = kind;
            assert!(translator.translate(&identity, &snapshot, timestamp()).is_empty());
        }

        let snapshot = MeterSnapshot {
            kind: MeterKind::TimeGauge,
            value: MeterValue::Gauge(1.0),
        };
        assert!(translator.translate(&identity, &snapshot, timestamp()).is_empty());
    }

    #[test]
    fn test_tag_values_sanitized() {
        let snapshot = MeterSnapshot {
            kind: MeterKind::Gauge,
            value: MeterValue::Gauge(1.0),
        };
        let identity = MetricIdentity::new("jvm.memory.used").with_tag("id", "G1 Eden Space");

        let points = Translator::default().translate(&identity, &snapshot, timestamp());
        assert_eq!(points[0].tags["id"], "G1_Eden_Space");
    }
}
