use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tags of a metric, ordered by key.
///
/// Keys are unique; inserting an existing key replaces its value.
pub type Tags = BTreeMap<String, String>;

/// The identity of a metric: its name and its tags.
///
/// Identities are values. Relabeling derives a new identity and never mutates the original, so
/// the aggregator can keep keying its state by the identity the application reported.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
pub struct MetricIdentity {
    /// The full metric name, for example `jvm.memory.used`.
    pub name: String,
    /// Tags attached to the metric.
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

impl MetricIdentity {
    /// Creates an identity without tags.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Tags::new(),
        }
    }

    /// Returns this identity with an additional tag, replacing an existing value for `key`.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Returns this identity with all given tags merged in.
    ///
    /// Merged tags overwrite existing tags with the same key, all other existing tags are kept.
    pub fn with_tags<K, V>(mut self, tags: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Returns this identity with its name replaced.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, value) in &self.tags {
            write!(f, ",{key}={value}")?;
        }
        Ok(())
    }
}
