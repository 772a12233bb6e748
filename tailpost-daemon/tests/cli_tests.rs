//! CLI argument parsing tests.

use clap::Parser;
use std::path::PathBuf;
use tailpost_daemon::cli::DaemonCli;

#[test]
fn test_default_config_path() {
    let cli = DaemonCli::try_parse_from(["tailpost-daemon"]).expect("should parse");
    assert_eq!(cli.config, PathBuf::from("/etc/tailpost/tailpost.toml"));
    assert!(!cli.validate);
    assert!(cli.log_level.is_none());
    assert!(cli.pos_dir.is_none());
}

#[test]
fn test_pos_dir_override_flag() {
    let cli = DaemonCli::try_parse_from(["tailpost-daemon", "--pos-dir", "/var/tmp/pos"])
        .expect("should parse");
    assert_eq!(cli.pos_dir.as_deref(), Some("/var/tmp/pos"));
}

#[test]
fn test_explicit_arguments() {
    let cli = DaemonCli::try_parse_from([
        "tailpost-daemon",
        "--config",
        "/tmp/t.toml",
        "--log-level",
        "debug",
        "--log-format",
        "pretty",
        "--validate",
    ])
    .expect("should parse");

    assert_eq!(cli.config, PathBuf::from("/tmp/t.toml"));
    assert_eq!(cli.log_level.as_deref(), Some("debug"));
    assert_eq!(cli.log_format.as_deref(), Some("pretty"));
    assert!(cli.validate);
}

#[test]
fn test_short_config_flag() {
    let cli =
        DaemonCli::try_parse_from(["tailpost-daemon", "-c", "./tailpost.toml"]).expect("should parse");
    assert_eq!(cli.config, PathBuf::from("./tailpost.toml"));
}

#[test]
fn test_unknown_flag_is_rejected() {
    assert!(DaemonCli::try_parse_from(["tailpost-daemon", "--bogus"]).is_err());
}
