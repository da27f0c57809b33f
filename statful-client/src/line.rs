use std::fmt::Write;

use statful_metrics::{OutboundPoint, PointKind, Tags};

/// Returns the type segment of the metric name.
fn type_name(kind: &PointKind) -> &'static str {
    match kind {
        PointKind::Counter => "counter",
        PointKind::Gauge => "gauge",
        PointKind::AggregatedTimer { .. } => "timer",
    }
}

/// Encodes a point as one line of the Statful protocol.
///
/// The line has the form `<prefix>.<type>.<name>[,<key>=<value>]* <value> <timestamp>`. Timer
/// facets are followed by ` <aggregation>,<frequency>`. Tags of the point take precedence over
/// `default_tags` with the same key.
pub fn encode_line(prefix: &str, default_tags: &Tags, point: &OutboundPoint) -> String {
    let mut line = String::with_capacity(64);

    if !prefix.is_empty() {
        line.push_str(prefix);
        line.push('.');
    }
    line.push_str(type_name(&point.kind));
    line.push('.');
    line.push_str(&point.name);

    let defaults = default_tags
        .iter()
        .filter(|(key, _)| !point.tags.contains_key(key.as_str()));
    let mut tags: Vec<_> = defaults.chain(&point.tags).collect();
    tags.sort_unstable_by(|a, b| a.0.cmp(b.0));

    for (key, value) in tags {
        // Writing into a `String` cannot fail.
        let _ = write!(line, ",{key}={value}");
    }

    let _ = write!(line, " {} {}", point.value, point.timestamp);

    if let PointKind::AggregatedTimer {
        aggregation,
        frequency,
    } = point.kind
    {
        let _ = write!(line, " {aggregation},{frequency}");
    }

    line
}
