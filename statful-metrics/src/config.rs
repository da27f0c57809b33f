use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parameters of the [`PublishService`](crate::PublishService) and its relabeling rules.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExporterConfig {
    /// The step interval in seconds.
    ///
    /// Defaults to `10` seconds. Every step, all aggregated state is flushed and published.
    pub step: u64,

    /// Tags to inject, keyed by metric name prefix.
    ///
    /// Values have the form `k1=v1;k2=v2`. All matching prefixes contribute tags; on key
    /// collisions the longest prefix wins.
    pub tags: BTreeMap<String, String>,

    /// Replacement names, keyed by metric name prefix.
    ///
    /// Only the longest matching prefix applies.
    pub alias: BTreeMap<String, String>,

    /// Prefixes of metrics to publish.
    ///
    /// A metric is published if its name or its alias starts with one of these prefixes. Defaults
    /// to an empty list, which publishes everything.
    pub accept: Vec<String>,

    /// Timer percentiles to publish, as fractions.
    ///
    /// Only `0.9`, `0.95` and `0.99` can be represented, all other values are ignored.
    pub percentiles: Vec<f64>,
}

impl ExporterConfig {
    /// Returns the step interval as a [`Duration`].
    ///
    /// A configured step of zero is raised to one second.
    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step.max(1))
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            step: 10,
            tags: BTreeMap::new(),
            alias: BTreeMap::new(),
            accept: Vec::new(),
            percentiles: vec![0.9, 0.95, 0.99],
        }
    }
}
