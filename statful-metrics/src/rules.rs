//! Prefix rules for tag injection and aliasing.

use std::collections::BTreeMap;

use crate::ExporterConfig;
use crate::identity::Tags;

/// Separates individual tags in a tag rule, as in `env=prod;region=eu`.
const TAG_SEPARATOR: char = ';';

/// Separates the key from the value of a single tag.
const KEY_VALUE_SEPARATOR: char = '=';

/// An error raised while building rule tables from configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleError {
    /// A tag segment does not contain a `=`.
    #[error("tag '{segment}' for prefix '{prefix}' is missing a '='")]
    MalformedTag {
        /// The prefix of the offending rule.
        prefix: String,
        /// The segment that failed to parse.
        segment: String,
    },
    /// A tag segment has nothing in front of its `=`.
    #[error("tag '{segment}' for prefix '{prefix}' has an empty key")]
    EmptyTagKey {
        /// The prefix of the offending rule.
        prefix: String,
        /// The segment that failed to parse.
        segment: String,
    },
}

/// Parses a tag rule of the form `k1=v1;k2=v2`.
///
/// Segments are split on the first `=`, so values may contain further `=` characters. Empty
/// segments, such as the one produced by a trailing `;`, are ignored.
pub fn parse_tags(prefix: &str, string: &str) -> Result<Tags, RuleError> {
    let mut tags = Tags::new();

    for segment in string.split(TAG_SEPARATOR).filter(|s| !s.is_empty()) {
        let (key, value) =
            segment
                .split_once(KEY_VALUE_SEPARATOR)
                .ok_or_else(|| RuleError::MalformedTag {
                    prefix: prefix.to_owned(),
                    segment: segment.to_owned(),
                })?;

        if key.is_empty() {
            return Err(RuleError::EmptyTagKey {
                prefix: prefix.to_owned(),
                segment: segment.to_owned(),
            });
        }

        tags.insert(key.to_owned(), value.to_owned());
    }

    Ok(tags)
}

#[derive(Clone, Debug)]
struct Rule<T> {
    prefix: String,
    payload: T,
}

/// A table of prefix rules of one kind.
///
/// Rules are kept ordered by descending prefix length, so the first match of a lookup is always
/// the most specific one. The empty prefix matches every name and therefore always sorts last.
#[derive(Clone, Debug)]
pub struct RuleTable<T> {
    rules: Vec<Rule<T>>,
}

impl<T> RuleTable<T> {
    /// Creates a table from `(prefix, payload)` pairs.
    pub fn new(rules: impl IntoIterator<Item = (String, T)>) -> Self {
        let mut rules: Vec<_> = rules
            .into_iter()
            .map(|(prefix, payload)| Rule { prefix, payload })
            .collect();

        // Prefixes of equal length cannot both match one name, the secondary key only makes the
        // order deterministic.
        rules.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });

        Self { rules }
    }

    /// Returns the number of rules in this table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if this table has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates all rules matching `name`, most specific first.
    pub fn matches<'a>(&'a self, name: &str) -> impl DoubleEndedIterator<Item = &'a T> {
        self.rules
            .iter()
            .filter(move |rule| name.starts_with(rule.prefix.as_str()))
            .map(|rule| &rule.payload)
    }

    /// Returns the payload of the longest prefix matching `name`.
    pub fn longest_match(&self, name: &str) -> Option<&T> {
        self.matches(name).next()
    }

    /// Iterates the prefixes in evaluation order.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.prefix.as_str())
    }
}

impl<T> Default for RuleTable<T> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

/// The tag injection and alias tables used for relabeling.
///
/// Built once at startup and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct RuleStore {
    tags: RuleTable<Tags>,
    alias: RuleTable<String>,
}

impl RuleStore {
    /// Creates a rule store from already parsed tables.
    pub fn new(tags: RuleTable<Tags>, alias: RuleTable<String>) -> Self {
        Self { tags, alias }
    }

    /// Builds the rule store from raw `tags` and `alias` maps.
    ///
    /// Fails on the first malformed tag rule; no partially built store is returned.
    pub fn from_maps(
        tags: &BTreeMap<String, String>,
        alias: &BTreeMap<String, String>,
    ) -> Result<Self, RuleError> {
        let tags = tags
            .iter()
            .map(|(prefix, string)| Ok((prefix.clone(), parse_tags(prefix, string)?)))
            .collect::<Result<Vec<_>, RuleError>>()?;

        let alias = alias
            .iter()
            .map(|(prefix, name)| (prefix.clone(), name.clone()));

        Ok(Self::new(RuleTable::new(tags), RuleTable::new(alias)))
    }

    /// Builds the rule store from the exporter configuration.
    pub fn from_config(config: &ExporterConfig) -> Result<Self, RuleError> {
        Self::from_maps(&config.tags, &config.alias)
    }

    /// Returns `true` if neither tag nor alias rules are configured.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.alias.is_empty()
    }

    /// Returns the tags to inject into a metric called `name`.
    ///
    /// All matching rules contribute. On key collisions, the longest matching prefix wins.
    pub fn tags_for(&self, name: &str) -> Tags {
        let mut tags = Tags::new();
        for rule_tags in self.tags.matches(name).rev() {
            tags.extend(rule_tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        tags
    }

    /// Returns the alias for a metric called `name`, if any rule matches.
    pub fn alias_for(&self, name: &str) -> Option<&str> {
        self.alias.longest_match(name).map(String::as_str)
    }

    /// Returns the tag injection table.
    pub fn tag_rules(&self) -> &RuleTable<Tags> {
        &self.tags
    }

    /// Returns the alias table.
    pub fn alias_rules(&self) -> &RuleTable<String> {
        &self.alias
    }
}
