//! The command line interface of the exporter.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Publishes application metrics to Statful in fixed steps.
#[derive(Debug, Parser)]
#[command(name = "statful", version, about, max_term_width = 100)]
pub struct Cli {
    /// The path to the config folder.
    #[arg(short, long, global = true, value_name = "DIR", env = "STATFUL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options overriding values of the config file.
#[derive(Debug, Args)]
pub struct OverrideArgs {
    /// The host:port of the Statful endpoint.
    #[arg(long, global = true, env = "STATFUL_HOST")]
    pub host: Option<String>,

    /// The namespace prepended to every metric.
    #[arg(long, global = true, env = "STATFUL_PREFIX")]
    pub prefix: Option<String>,

    /// The step interval in seconds.
    #[arg(long, global = true, env = "STATFUL_STEP")]
    pub step: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the exporter until interrupted.
    Run,

    /// Manage the configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Show how a metric is published under the configured rules.
    Relabel(RelabelArgs),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as YAML.
    Show,
}

#[derive(Debug, Args)]
pub struct RelabelArgs {
    /// The metric name as reported by the application.
    pub name: String,

    /// A tag of the reported metric, as key=value. Can be repeated.
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    pub tags: Vec<(String, String)>,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

fn parse_tag(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
