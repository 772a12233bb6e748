//! Command-line surface of the daemon.

use std::path::PathBuf;

use clap::Parser;

/// Tails rotating log files and forwards parsed records to a
/// fluent collector or an aggregated stream.
#[derive(Parser, Debug)]
#[command(name = "tailpost-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to tailpost.toml.
    #[arg(short, long, default_value = "/etc/tailpost/tailpost.toml")]
    pub config: PathBuf,

    /// Directory for sent-position files. Overrides `general.pos_dir`.
    #[arg(long)]
    pub pos_dir: Option<String>,

    /// Log level used when `RUST_LOG` is not set (trace, debug, info,
    /// warn, error). Overrides the config file.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, pretty). Overrides the config file.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Check the configuration and exit.
    #[arg(long)]
    pub validate: bool,
}
