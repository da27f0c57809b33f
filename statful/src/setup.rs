use statful_config::Config;

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        statful_log::info!("launching exporter without config folder");
    } else {
        statful_log::info!(
            "launching exporter from config folder {}",
            config.path().display()
        );
    }

    let client = config.client();
    statful_log::info!("  statful host: {}", client.host);
    statful_log::info!("  metric prefix: {}", client.prefix);
    statful_log::info!("  step: {}s", config.step().as_secs());

    let metrics = config.metrics();
    statful_log::info!(
        "  rules: {} tag, {} alias, {} accept",
        metrics.tags.len(),
        metrics.alias.len(),
        metrics.accept.len()
    );
}
