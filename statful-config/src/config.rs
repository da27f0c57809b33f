use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use statful_client::ClientConfig;
use statful_log::LogConfig;
use statful_metrics::{ExporterConfig, Relabeler, RuleStore};

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field, either from a file or an override.
    Field(&'static str),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (file {})", file_name.display())
            }
            ConfigErrorSource::Field(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug, thiserror::Error)]
#[error("{kind}{origin}")]
pub struct ConfigError {
    origin: ConfigErrorSource,
    kind: ConfigErrorKind,
    #[source]
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            origin: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(cause: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            cause: Some(Box::new(cause)),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn for_field<E>(cause: E, field: &'static str) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap(cause, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.origin = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.origin = ConfigErrorSource::Field(name);
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

enum ConfigFormat {
    Yaml,
}

impl ConfigFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yml",
        }
    }
}

trait ConfigObject: DeserializeOwned + Serialize {
    /// The format in which to serialize this configuration.
    fn format() -> ConfigFormat;

    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.{}", Self::name(), Self::format().extension()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        match Self::format() {
            ConfigFormat::Yaml => serde_yaml::from_reader(io::BufReader::new(f))
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path)),
        }
    }
}

/// Structure used to hold information about configuration overrides via command line parameters.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The `host:port` of the Statful endpoint.
    pub host: Option<String>,
    /// The namespace prepended to every metric.
    pub prefix: Option<String>,
    /// The step interval in seconds.
    pub step: Option<String>,
}

/// The full configuration file of the exporter.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ConfigValues {
    /// Logging setup.
    pub logging: LogConfig,
    /// Step, relabeling rules and percentiles.
    pub metrics: ExporterConfig,
    /// Connection to Statful.
    pub client: ClientConfig,
}

impl ConfigObject for ConfigValues {
    fn format() -> ConfigFormat {
        ConfigFormat::Yaml
    }

    fn name() -> &'static str {
        "config"
    }
}

/// Config struct.
#[derive(Debug, Default)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// The folder must contain a `config.yml`. Relabeling rules are validated while loading.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let config = Config {
            values: ConfigValues::load(&path)?,
            path: path.clone(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        let config = Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Override configuration with values coming from the command line.
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(host) = overrides.host {
            if host.is_empty() {
                return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("host"));
            }
            self.values.client.host = host;
        }

        if let Some(prefix) = overrides.prefix {
            self.values.client.prefix = prefix;
        }

        if let Some(step) = overrides.step {
            let step = step
                .parse()
                .map_err(|err| ConfigError::for_field(err, "step"))?;
            if step == 0 {
                return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("step"));
            }
            self.values.metrics.step = step;
        }

        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let metrics = &self.values.metrics;

        RuleStore::from_config(metrics)
            .map_err(|err| ConfigError::for_field(err, "metrics.tags"))?;

        if metrics.step == 0 {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("metrics.step"));
        }

        Ok(())
    }

    /// Returns the path of the config directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the raw configuration values.
    pub fn values(&self) -> &ConfigValues {
        &self.values
    }

    /// Serializes the effective configuration to YAML.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadYaml))
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the exporter configuration.
    pub fn metrics(&self) -> &ExporterConfig {
        &self.values.metrics
    }

    /// Returns the Statful client configuration.
    pub fn client(&self) -> &ClientConfig {
        &self.values.client
    }

    /// Returns the interval between two publish cycles.
    pub fn step(&self) -> Duration {
        self.values.metrics.step()
    }

    /// Builds the relabeler for the configured rules.
    pub fn relabeler(&self) -> Result<Relabeler, ConfigError> {
        Relabeler::from_config(&self.values.metrics)
            .map_err(|err| ConfigError::for_field(err, "metrics.tags"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use similar_asserts::assert_eq;

    use super::*;

    fn write_config(contents: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("config.yml")).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        dir
    }

    #[test]
    fn test_load_yaml() {
        let dir = write_config(
            r#"
metrics:
  step: 30
  tags:
    jvm: env=prod;region=eu
  alias:
    jvm: virtual
client:
  host: statful.internal:2013
  default_tags:
    app: billing
"#,
        );

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.step(), Duration::from_secs(30));
        assert_eq!(config.metrics().alias["jvm"], "virtual");
        assert_eq!(config.client().host, "statful.internal:2013");
        assert_eq!(config.client().prefix, "application");
        assert_eq!(config.metrics().percentiles, vec![0.9, 0.95, 0.99]);

        let relabeler = config.relabeler().unwrap();
        assert_eq!(relabeler.rules().tag_rules().len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert!(error.to_string().contains("config.yml"));
    }

    #[test]
    fn test_bad_yaml() {
        let dir = write_config("metrics: [");
        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
    }

    #[test]
    fn test_malformed_tag_rule() {
        let dir = write_config(
            r#"
metrics:
  tags:
    jvm: env
"#,
        );

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        insta::assert_snapshot!(error.to_string(), @"invalid config value (field metrics.tags)");
        assert!(error.source().is_some());
    }

    #[test]
    fn test_from_json_value_defaults() {
        let config = Config::from_json_value(serde_json::json!({})).unwrap();
        assert_eq!(config.step(), Duration::from_secs(10));
        assert_eq!(config.client(), &ClientConfig::default());
    }

    #[test]
    fn test_zero_step() {
        let error =
            Config::from_json_value(serde_json::json!({"metrics": {"step": 0}})).unwrap_err();
        insta::assert_snapshot!(error.to_string(), @"invalid config value (field metrics.step)");
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();
        config
            .apply_override(OverridableConfig {
                host: Some("10.0.0.1:2013".to_owned()),
                prefix: Some("billing".to_owned()),
                step: Some("60".to_owned()),
            })
            .unwrap();

        assert_eq!(config.client().host, "10.0.0.1:2013");
        assert_eq!(config.client().prefix, "billing");
        assert_eq!(config.step(), Duration::from_secs(60));
    }

    #[test]
    fn test_apply_override_invalid_step() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();
        let error = config
            .apply_override(OverridableConfig {
                step: Some("soon".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        insta::assert_snapshot!(error.to_string(), @"invalid config value (field step)");
    }

    #[test]
    fn test_to_yaml_roundtrip_defaults() {
        let config = Config::default();
        let yaml = config.to_yaml_string().unwrap();
        let values: ConfigValues = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(values.metrics, ExporterConfig::default());
    }
}
