use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Connection parameters of the [`StatfulClient`](crate::StatfulClient).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// The `host:port` of the Statful endpoint receiving metrics over UDP.
    ///
    /// Defaults to `127.0.0.1:2013`.
    pub host: String,

    /// The namespace prepended to every metric.
    ///
    /// Defaults to `application`.
    pub prefix: String,

    /// Tags added to every metric.
    ///
    /// Tags of a metric take precedence over default tags with the same key.
    pub default_tags: BTreeMap<String, String>,

    /// Batches several lines into one datagram.
    ///
    /// Defaults to `true`. Buffered lines are sent when the buffer is full and at the end of
    /// every publish cycle.
    pub buffered: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:2013".to_owned(),
            prefix: "application".to_owned(),
            default_tags: BTreeMap::new(),
            buffered: true,
        }
    }
}
