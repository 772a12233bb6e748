//! Configuration loading and validation tests.
//!
//! Tests TOML parsing, environment variable overrides, partial configs, and validation.

use serial_test::serial;
use tailpost_core::config::{SinkConfig, TailpostConfig};
use tailpost_core::error::{ConfigError, TailpostError};

#[test]
fn test_parse_full_config() {
    // Given: A complete TOML config with two sources
    let toml_str = r#"
[general]
log_level = "debug"
log_format = "pretty"
pos_dir = "/var/lib/tailpost/pos"

[metrics]
enabled = true
listen_addr = "0.0.0.0"
port = 9189

[[sources]]
tag = "game-play"
dir = "/var/log/game"
pattern = "play_*.log"
latest = "play.log"
order_pattern = '(?P<date>\d{8})-(?P<order>\d+)'
bulk_size = 100

[sources.parser.tokens]
date = '\d{4}-\d{2}-\d{2}'
body = ['%(\{.*\})', 'json(_)']

[sources.parser]
formats = ['%{date} %{body}']

[sources.sink]
kind = "forward"
host = "collector.internal"
port = 24224

[[sources]]
tag = "audit"
dir = "/var/log/audit"
pattern = "*.log"

[sources.sink]
kind = "stream"
stream_name = "audit-stream"
region = "ap-northeast-2"
"#;

    // When: Parsing and validating
    let config = TailpostConfig::parse(toml_str).expect("should parse");
    config.validate().expect("should validate");

    // Then: Both sources should be present with their sinks
    assert_eq!(config.sources.len(), 2);
    assert_eq!(config.general.log_level, "debug");
    assert!(config.metrics.enabled);
    assert!(matches!(
        config.sources[0].sink,
        SinkConfig::Forward { ref host, .. } if host == "collector.internal"
    ));
    assert!(matches!(
        config.sources[1].sink,
        SinkConfig::Stream { ref stream_name, .. } if stream_name == "audit-stream"
    ));
}

#[test]
fn test_partial_config_uses_defaults() {
    // Given: A config with only a source
    let toml_str = r#"
[[sources]]
tag = "minimal"
dir = "/logs"
"#;

    // When: Parsing
    let config = TailpostConfig::parse(toml_str).expect("should parse");

    // Then: Defaults fill the rest
    assert_eq!(config.general.log_level, "info");
    assert!(!config.metrics.enabled);
    assert_eq!(config.sources[0].pattern, "*.log");
    assert_eq!(config.sources[0].bulk_size, 200);
    assert!(matches!(config.sources[0].sink, SinkConfig::Forward { .. }));
}

#[test]
fn test_validation_rejects_conflicting_extractors() {
    let toml_str = r#"
[[sources]]
tag = "conflict"
dir = "/logs"
format = '.*'

[sources.parser]
formats = ['.*']
"#;
    let config = TailpostConfig::parse(toml_str).expect("should parse");
    let err = config.validate().expect_err("should reject");
    assert!(err.to_string().contains("mutually exclusive"));
}

#[test]
fn test_validation_rejects_empty_tag() {
    let toml_str = r#"
[[sources]]
tag = ""
dir = "/logs"
"#;
    let config = TailpostConfig::parse(toml_str).expect("should parse");
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn test_env_override_beats_file_value() {
    // Given: A config file value and a conflicting env var
    let mut config = TailpostConfig::parse("[general]\nlog_level = \"info\"").unwrap();
    // SAFETY: env vars are only mutated inside #[serial] tests.
    unsafe { std::env::set_var("TAILPOST_GENERAL_LOG_LEVEL", "trace") };

    // When: Applying overrides
    config.apply_env_overrides();

    // Then: The env var wins
    assert_eq!(config.general.log_level, "trace");
    unsafe { std::env::remove_var("TAILPOST_GENERAL_LOG_LEVEL") };
}

#[tokio::test]
async fn test_load_reports_missing_file() {
    let result = TailpostConfig::load("/definitely/not/here/tailpost.toml").await;
    assert!(matches!(
        result,
        Err(TailpostError::Config(ConfigError::FileNotFound { .. }))
    ));
}

#[tokio::test]
async fn test_load_from_file_roundtrip() {
    // Given: A config written to disk
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tailpost.toml");
    std::fs::write(
        &path,
        r#"
[general]
pos_dir = "/tmp/tailpost-test/pos"

[[sources]]
tag = "file-test"
dir = "/logs"
"#,
    )
    .unwrap();

    // When: Loading it
    let config = TailpostConfig::from_file(&path).await.expect("should load");

    // Then: Values from the file are used
    assert_eq!(config.general.pos_dir, "/tmp/tailpost-test/pos");
    assert_eq!(config.sources[0].tag, "file-test");
}
