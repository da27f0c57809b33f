//! Step aggregation, relabeling and publishing of application metrics.
//!
//! Applications report measurements into an [`Aggregator`], keyed by [`MetricIdentity`]. Once
//! every step, the [`PublishService`] flushes the aggregator, derives the published identity of
//! every metric with the [`Relabeler`], converts each end-of-step snapshot into
//! [`OutboundPoint`]s with the [`Translator`] and hands them to a [`Transport`].
//!
//! # Relabeling
//!
//! Relabeling is driven by two prefix-keyed rule tables in the [`ExporterConfig`]:
//!
//! - `tags` injects tags into every metric whose name starts with the prefix. All matching
//!   prefixes contribute; on key collisions the longest prefix wins.
//! - `alias` replaces the name of a metric. Only the longest matching prefix applies, and it
//!   replaces the name entirely.
//!
//! ```
//! use std::collections::BTreeMap;
//! use statful_metrics::{ExporterConfig, MetricIdentity, Relabeler};
//!
//! let config = ExporterConfig {
//!     tags: BTreeMap::from([("jvm".to_owned(), "env=prod".to_owned())]),
//!     alias: BTreeMap::from([("jvm".to_owned(), "virtual".to_owned())]),
//!     ..Default::default()
//! };
//!
//! let relabeler = Relabeler::from_config(&config).unwrap();
//! let identity = relabeler.relabel(&MetricIdentity::new("jvm.memory.used"));
//!
//! assert_eq!(identity.name, "virtual");
//! assert_eq!(identity.tags["env"], "prod");
//! ```
//!
//! # Timers
//!
//! Timer windows are published as up to six points: `count`, `avg`, `max` and the configured
//! percentiles out of `p90`, `p95` and `p99`. Percentiles use the nearest-rank method over all
//! samples of the window. Every timer point carries an aggregation frequency of
//! [`TIMER_AGGREGATION_FREQUENCY`] seconds.
#![warn(missing_docs)]

pub mod aggregator;
mod config;
mod identity;
pub mod relabel;
pub mod rules;
mod service;
pub mod snapshot;
mod time;
mod transport;

pub use aggregator::{AggregateMetricsError, Aggregator, MeterKind};
pub use config::*;
pub use identity::*;
pub use relabel::Relabeler;
pub use rules::{RuleError, RuleStore};
pub use service::*;
pub use snapshot::{
    Aggregation, OutboundPoint, PointKind, PointValue, TIMER_AGGREGATION_FREQUENCY, Translator,
};
pub use time::*;
pub use transport::*;
