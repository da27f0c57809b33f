//! Renaming and tagging of metric identities before emission.

use crate::ExporterConfig;
use crate::identity::MetricIdentity;
use crate::rules::{RuleError, RuleStore};

/// Applies a [`RuleStore`] to metric identities.
///
/// Relabeling is pure: it derives a new identity and never touches the input.
#[derive(Clone, Debug, Default)]
pub struct Relabeler {
    rules: RuleStore,
    accept: Vec<String>,
}

impl Relabeler {
    /// Creates a relabeler that accepts every metric.
    pub fn new(rules: RuleStore) -> Self {
        Self {
            rules,
            accept: Vec::new(),
        }
    }

    /// Restricts published metrics to the given name prefixes.
    ///
    /// An empty list accepts everything.
    pub fn with_accept(mut self, accept: impl IntoIterator<Item = String>) -> Self {
        self.accept = accept.into_iter().collect();
        self
    }

    /// Builds the relabeler from the exporter configuration.
    pub fn from_config(config: &ExporterConfig) -> Result<Self, RuleError> {
        let rules = RuleStore::from_config(config)?;
        Ok(Self::new(rules).with_accept(config.accept.iter().cloned()))
    }

    /// Returns the underlying rule store.
    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    /// Derives the identity under which a metric is published.
    ///
    /// Injected tags overwrite existing tags with the same key. The alias lookup runs against the
    /// original name, and an alias replaces the name entirely.
    pub fn relabel(&self, identity: &MetricIdentity) -> MetricIdentity {
        if self.rules.is_empty() {
            return identity.clone();
        }

        let mut relabeled = identity
            .clone()
            .with_tags(self.rules.tags_for(&identity.name));

        if let Some(alias) = self.rules.alias_for(&identity.name) {
            relabeled.name = alias.to_owned();
        }

        relabeled
    }

    /// Returns `true` if the metric should be published.
    ///
    /// Both the original name and the alias it would receive are checked against the accepted
    /// prefixes.
    pub fn accepts(&self, identity: &MetricIdentity) -> bool {
        if self.accept.is_empty() {
            return true;
        }

        let alias = self.rules.alias_for(&identity.name);
        self.accept.iter().any(|prefix| {
            identity.name.starts_with(prefix.as_str())
                || alias.is_some_and(|alias| alias.starts_with(prefix.as_str()))
        })
    }
}
