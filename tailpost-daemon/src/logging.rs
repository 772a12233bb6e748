//! Tracing setup for the daemon.
//!
//! The level filter comes from `RUST_LOG` when set, otherwise from
//! `general.log_level` in the config. `log_format` picks JSON lines
//! (for collectors) or pretty output (for terminals).

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tailpost_core::config::GeneralConfig;

/// Install the global subscriber. Call once, before the first log line.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    let fmt = tracing_subscriber::fmt::layer();

    match config.log_format.as_str() {
        "json" => registry.with(fmt.json()).try_init(),
        "pretty" => registry.with(fmt.pretty()).try_init(),
        other => anyhow::bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}
