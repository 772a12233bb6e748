use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tailpost_core::config::TailpostConfig;
use tailpost_daemon::cli::DaemonCli;
use tailpost_daemon::{logging, metrics_server};
use tailpost_tail::engine::TailEngine;
use tailpost_tail::sink::Sink;
use tailpost_tail::supervisor::Supervisor;

/// Worker wake-up granularity. Per-source send/update intervals are
/// enforced inside the engine, so the loop only needs to be at least
/// as fine as the smallest configurable interval.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = TailpostConfig::load(&cli.config)
        .await
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    // CLI flags win over both the config file and TAILPOST_* overrides
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(pos_dir) = &cli.pos_dir {
        config.general.pos_dir = pos_dir.clone();
    }
    config.validate().context("invalid configuration")?;

    if cli.validate {
        println!(
            "configuration OK: {} source(s), pos_dir {}",
            config.sources.len(),
            config.general.pos_dir
        );
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    info!(version = env!("CARGO_PKG_VERSION"), "tailpost-daemon starting");

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
        metrics_server::spawn_uptime_gauge();
    }

    if config.sources.is_empty() {
        anyhow::bail!("no sources configured, nothing to tail");
    }

    let mut supervisor = Supervisor::new();
    for source in &config.sources {
        let sink = Sink::from_config(&source.sink).await.map_err(|e| {
            anyhow::anyhow!("failed to build sink for source '{}': {}", source.tag, e)
        })?;
        let engine = TailEngine::new(source, &config.general.pos_dir, sink).map_err(|e| {
            anyhow::anyhow!("failed to build engine for source '{}': {}", source.tag, e)
        })?;
        supervisor.spawn(source.tag.clone(), engine, POLL_INTERVAL);
        info!(source = source.tag.as_str(), dir = source.dir.as_str(), "source registered");
    }

    info!(sources = supervisor.worker_count(), "tailpost-daemon running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    supervisor.shutdown().await;
    info!("tailpost-daemon shut down");
    Ok(())
}
