use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use statful_client::StatfulClient;
use statful_config::{Config, OverridableConfig};
use statful_metrics::{Aggregator, MetricIdentity, PublishService};

use crate::cliapp::{Cli, Command, ConfigCommand, OverrideArgs, RelabelArgs};
use crate::setup;

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    config.apply_override(extract_config_args(cli.overrides))?;

    statful_log::init(config.logging());

    match cli.command {
        Command::Run => run(config),
        Command::Config(ConfigCommand::Show) => show_config(&config),
        Command::Relabel(args) => relabel(&config, args),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Extract config arguments from the parsed command line.
fn extract_config_args(args: OverrideArgs) -> OverridableConfig {
    OverridableConfig {
        host: args.host,
        prefix: args.prefix,
        step: args.step,
    }
}

fn show_config(config: &Config) -> Result<()> {
    let yaml = config.to_yaml_string()?;
    std::io::stdout().write_all(yaml.as_bytes())?;
    Ok(())
}

fn relabel(config: &Config, args: RelabelArgs) -> Result<()> {
    let relabeler = config.relabeler()?;
    let identity = MetricIdentity::new(args.name).with_tags(args.tags);

    let relabeled = relabeler.relabel(&identity);
    let accepted = relabeler.accepts(&identity);

    let mut stdout = std::io::stdout().lock();
    if args.json {
        let output = serde_json::json!({
            "identity": relabeled,
            "accepted": accepted,
        });
        serde_json::to_writer_pretty(&mut stdout, &output)?;
        writeln!(stdout)?;
    } else {
        writeln!(stdout, "{relabeled}")?;
        if !accepted {
            writeln!(stdout, "(not accepted, will not be published)")?;
        }
    }

    Ok(())
}

fn run(config: Config) -> Result<()> {
    setup::dump_spawn_infos(&config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("statful-publish")
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(async {
        let client = StatfulClient::new(config.client())?;
        let aggregator = Arc::new(Aggregator::new());
        let service = PublishService::new(config.metrics(), aggregator, client)?;
        let handle = service.start();

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;

        statful_log::info!("shutting down");
        handle.shutdown().await;
        Ok::<_, anyhow::Error>(())
    })
}
