use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// All crates in the workspace, logged with the configured level.
///
/// Third-party crates are capped at `INFO`.
const CRATE_NAMES: &[&str] = &[
    "statful",
    "statful_client",
    "statful_config",
    "statful_log",
    "statful_metrics",
];

/// The minimum level of log messages that are emitted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Disables logging entirely.
    Off,
    /// Only errors.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages, the default.
    #[default]
    Info,
    /// Messages relevant to debugging.
    Debug,
    /// All messages.
    Trace,
}

impl Level {
    /// Returns the corresponding [`LevelFilter`] of the `tracing` crate.
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.level_filter().fmt(f)
    }
}

/// Controls the log format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    #[default]
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///   2024-02-13T09:12:41.201453Z  INFO statful_metrics::service: publishing every 10s
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-02-13T09:12:41.201453Z  INFO statful_metrics::service: publishing every 10s
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-02-13T09:12:41.201453Z","level":"INFO","message":"publishing every 10s","target":"statful_metrics::service"}
    /// ```
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for the exporter.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,
}

/// Builds the filter directives used when `RUST_LOG` is not set.
#[cfg_attr(not(feature = "init"), allow(dead_code))]
fn default_directives(level: Level) -> String {
    let level = level.level_filter();
    let third_party = std::cmp::min(level, LevelFilter::INFO);

    let mut directives = third_party.to_string().to_lowercase();
    for name in CRATE_NAMES {
        directives.push_str(&format!(",{name}={}", level.to_string().to_lowercase()));
    }
    directives
}

/// Initialize the logging system.
///
/// If the `RUST_LOG` environment variable is set, it takes precedence over the configured level.
/// Calling this more than once has no effect.
///
/// # Example
///
/// ```ignore
/// let log_config = statful_log::LogConfig::default();
/// statful_log::init(&log_config);
/// ```
#[cfg(feature = "init")]
pub fn init(config: &LogConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config.level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => builder.pretty().try_init(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            builder.with_ansi(false).try_init()
        }
        (LogFormat::Json, _) => builder
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .try_init(),
    };

    if result.is_err() {
        crate::debug!("logging was already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(
            default_directives(Level::Debug),
            "info,statful=debug,statful_client=debug,statful_config=debug,\
             statful_log=debug,statful_metrics=debug"
        );
    }

    #[test]
    fn test_default_directives_caps_third_party() {
        let directives = default_directives(Level::Error);
        assert!(directives.starts_with("error,"));
        assert!(directives.ends_with("statful_metrics=error"));
    }

    #[test]
    fn test_deserialize_config() {
        let config: LogConfig =
            serde_json::from_str(r#"{"level": "trace", "format": "json"}"#).unwrap();
        assert_eq!(config.level, Level::Trace);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, LogFormat::Auto);
    }
}
