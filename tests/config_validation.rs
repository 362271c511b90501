//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;
use v2x_beacon::config::{BeaconConfig, LimitsConfig, LoggingConfig, TransportConfig};
use v2x_beacon::error::ProtocolError;
use v2x_beacon::protocol::BeaconEngine;
use v2x_beacon::utils::crypto::AuthKey;

fn errors_of(config: &BeaconConfig) -> Vec<String> {
    config.validate()
}

fn has(errors: &[String], needle: &str) -> bool {
    errors.iter().any(|e| e.contains(needle))
}

#[test]
fn test_default_config_validates() {
    let errors = errors_of(&BeaconConfig::default());
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_defaults_match_firmware_constants() {
    let config = BeaconConfig::default();
    assert_eq!(config.protocol.beacon_period, Duration::from_millis(100));
    assert_eq!(config.protocol.freshness_window, Duration::from_millis(5_000));
    assert_eq!(config.protocol.max_per_second, 50);
    assert_eq!(config.protocol.nonce_window, 20);
    assert!(config.protocol.strict_nonce_order);
    assert_eq!(config.limits.max_neighbors, 20);
    assert_eq!(config.limits.max_rate_senders, 10);

    let replay = config.replay_settings();
    assert_eq!(replay.window_size, 20);
    assert_eq!(replay.freshness_ms, 5_000);

    let rate = config.rate_settings();
    assert_eq!(rate.max_per_window, 50);
    assert_eq!(rate.window_ms, 1_000);
}

#[test]
fn test_invalid_node_id() {
    let mut config = BeaconConfig::default();
    config.node.id = String::new();
    assert!(has(&errors_of(&config), "Invalid node id"));

    config.node.id = "THIS-ID-IS-WAY-TOO-LONG".into();
    assert!(has(&errors_of(&config), "Invalid node id"));
}

#[test]
fn test_bad_key_material() {
    let mut config = BeaconConfig::default();
    config.node.key = Some("abcd".into());
    assert!(has(&errors_of(&config), "Node key must be"));

    config.node.key = Some("zz".repeat(16));
    assert!(has(&errors_of(&config), "not valid hex"));

    config.node.key = Some("00".repeat(32));
    assert!(errors_of(&config).is_empty());
    assert_eq!(config.node.auth_key().unwrap().len(), 32);
}

#[test]
fn test_missing_key_is_config_error() {
    let config = BeaconConfig::default();
    assert!(matches!(
        config.node.auth_key(),
        Err(ProtocolError::ConfigError(_))
    ));
}

#[test]
fn test_short_beacon_period() {
    let mut config = BeaconConfig::default();
    config.protocol.beacon_period = Duration::from_millis(5);
    assert!(has(&errors_of(&config), "Beacon period too short"));
}

#[test]
fn test_freshness_shorter_than_period() {
    let mut config = BeaconConfig::default();
    config.protocol.freshness_window = Duration::from_millis(100);
    assert!(has(
        &errors_of(&config),
        "Freshness window must be longer than the beacon period"
    ));
}

#[test]
fn test_zero_rate_limit() {
    let mut config = BeaconConfig::default();
    config.protocol.max_per_second = 0;
    assert!(has(
        &errors_of(&config),
        "Max messages per window must be greater than 0"
    ));
}

#[test]
fn test_zero_nonce_window() {
    let mut config = BeaconConfig::default();
    config.protocol.nonce_window = 0;
    assert!(has(&errors_of(&config), "Nonce window must be greater than 0"));
}

#[test]
fn test_staleness_not_above_period() {
    let mut config = BeaconConfig::default();
    config.protocol.neighbor_staleness = config.protocol.beacon_period;
    assert!(has(
        &errors_of(&config),
        "Neighbor staleness must be longer than the beacon period"
    ));
}

#[test]
fn test_zero_capacities() {
    let limits = LimitsConfig {
        max_neighbors: 0,
        inbound_queue: 0,
        ..LimitsConfig::default()
    };
    let errors = limits.validate();
    assert!(has(&errors, "Max neighbors must be greater than 0"));
    assert!(has(&errors, "Inbound queue must be greater than 0"));
}

#[test]
fn test_replay_table_smaller_than_rate_table() {
    let limits = LimitsConfig {
        max_rate_senders: 40,
        max_replay_senders: 20,
        ..LimitsConfig::default()
    };
    assert!(has(
        &limits.validate(),
        "Max replay senders should be at least max rate senders"
    ));
}

#[test]
fn test_invalid_transport_address() {
    let transport = TransportConfig {
        broadcast_address: "255.255.255.255".into(),
        ..TransportConfig::default()
    };
    assert!(has(&transport.validate(), "Invalid broadcast address format"));
}

#[test]
fn test_logging_needs_an_output() {
    let logging = LoggingConfig {
        log_to_console: false,
        log_to_file: false,
        ..LoggingConfig::default()
    };
    assert!(has(&logging.validate(), "At least one logging output"));

    let logging = LoggingConfig {
        log_to_file: true,
        log_file_path: None,
        ..LoggingConfig::default()
    };
    assert!(has(&logging.validate(), "log_file_path must be specified"));
}

#[test]
fn test_validate_strict_joins_errors() {
    let mut config = BeaconConfig::default();
    config.protocol.max_per_second = 0;
    config.limits.max_neighbors = 0;

    match config.validate_strict() {
        Err(ProtocolError::ConfigError(msg)) => {
            assert!(msg.contains("Max messages per window"));
            assert!(msg.contains("Max neighbors"));
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn test_engine_refuses_invalid_config() {
    let mut config = BeaconConfig::default();
    config.protocol.nonce_window = 0;
    let key = AuthKey::from_bytes(&[1u8; 32]).unwrap();
    assert!(matches!(
        BeaconEngine::new(&config, key),
        Err(ProtocolError::ConfigError(_))
    ));
}

#[test]
fn test_partial_toml_fills_defaults() {
    let config = BeaconConfig::from_toml(
        r#"
        [node]
        id = "AMB7"

        [protocol]
        beacon_period = 200
        strict_nonce_order = false

        [logging]
        log_level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.node.id, "AMB7");
    assert_eq!(config.protocol.beacon_period, Duration::from_millis(200));
    assert!(!config.protocol.strict_nonce_order);
    assert_eq!(config.protocol.freshness_window, Duration::from_millis(5_000));
    assert_eq!(config.limits.max_neighbors, 20);
    assert_eq!(config.logging.log_level, tracing::Level::DEBUG);
    assert!(config.validate().is_empty());
}

#[test]
fn test_example_config_round_trips() {
    let text = BeaconConfig::example_config();
    let parsed = BeaconConfig::from_toml(&text).unwrap();
    assert_eq!(parsed.node.id, BeaconConfig::default().node.id);
    assert_eq!(parsed.protocol.beacon_period, Duration::from_millis(100));
}

#[test]
fn test_bad_toml_is_config_error() {
    assert!(matches!(
        BeaconConfig::from_toml("[protocol]\nbeacon_period = \"fast\""),
        Err(ProtocolError::ConfigError(_))
    ));
}

#[test]
fn test_env_overrides_and_bad_number() {
    std::env::set_var("V2X_BEACON_NODE_ID", "ENV1");
    std::env::set_var("V2X_BEACON_PERIOD_MS", "200");
    std::env::set_var("V2X_BEACON_BROADCAST_ADDRESS", "192.168.1.255:47474");
    let config = BeaconConfig::from_env().unwrap();
    assert_eq!(config.node.id, "ENV1");
    assert_eq!(config.protocol.beacon_period, Duration::from_millis(200));
    assert_eq!(config.transport.broadcast_address, "192.168.1.255:47474");

    std::env::set_var("V2X_BEACON_PERIOD_MS", "soon");
    assert!(matches!(
        BeaconConfig::from_env(),
        Err(ProtocolError::ConfigError(msg)) if msg.contains("V2X_BEACON_PERIOD_MS")
    ));

    for name in [
        "V2X_BEACON_NODE_ID",
        "V2X_BEACON_PERIOD_MS",
        "V2X_BEACON_BROADCAST_ADDRESS",
    ] {
        std::env::remove_var(name);
    }
}

#[test]
fn test_save_and_reload() {
    let path = std::env::temp_dir().join(format!("v2x-beacon-{}.toml", std::process::id()));
    let config = BeaconConfig::default_with_overrides(|c| {
        c.node.id = "SAVED".into();
        c.limits.max_neighbors = 7;
    });
    config.save_to_file(&path).unwrap();
    let loaded = BeaconConfig::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded.node.id, "SAVED");
    assert_eq!(loaded.limits.max_neighbors, 7);
    assert!(BeaconConfig::from_file(&path).is_err());
}
