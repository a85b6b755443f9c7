use sensebridge::config::parse::{load_config_str, ConfigError};
use sensebridge::config::types::InfluxVersion;
use sensebridge::config::load_config;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const MINIMAL_CONFIG: &str = r#"
udp:
  user_events:
    listen: "0.0.0.0:9997"
  log_events:
    listen: "0.0.0.0:9996"
audit:
  server:
    listen: "0.0.0.0:8761"
"#;

#[test]
fn test_minimal_config_gets_defaults() {
    let config = load_config_str(MINIMAL_CONFIG).unwrap();

    let queue = &config.udp.user_events.queue;
    assert_eq!(queue.max_concurrent, 4);
    assert_eq!(queue.max_size, 1000);
    assert_eq!(queue.backpressure_threshold_percent, 80);
    assert_eq!(queue.max_message_size_bytes, 65507);
    assert_eq!(queue.handler_timeout, Duration::from_secs(30));
    assert_eq!(queue.queue_full_log_throttle, Duration::from_secs(10));
    assert!(!queue.rate_limit.enable);

    assert_eq!(config.audit.queue.max_pending, 5000);
    assert!(config.destinations.influxdb.is_none());
    assert!(config.destinations.parquet.is_none());
    assert!(config.destinations.qvd.is_none());
}

#[test]
fn test_load_config_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(&config_path, MINIMAL_CONFIG).unwrap();

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.udp.user_events.listen, "0.0.0.0:9997");
}

#[test]
fn test_missing_file_is_an_error() {
    let result = load_config(std::path::Path::new("/nonexistent/config.yml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_full_config_round_trip() {
    let yaml = r#"
udp:
  user_events:
    listen: "127.0.0.1:9997"
    queue:
      max_concurrent: 8
      max_size: 500
      backpressure_threshold_percent: 70
      max_message_size_bytes: 4096
      handler_timeout: 10s
      queue_full_log_throttle: 5s
      rate_limit:
        enable: true
        max_messages_per_minute: 100
        violation_log_throttle: 15s
  log_events:
    listen: "127.0.0.1:9996"
audit:
  server:
    listen: "127.0.0.1:8761"
  queue:
    max_pending: 250
    rate_limit:
      enable: true
      max_messages_per_minute: 50
destinations:
  influxdb:
    enable: true
    version: v2
    url: http://localhost:8086
    org: myorg
    bucket: events
    token: secret
    buffering:
      write_frequency: 5s
      max_batch_size: 200
  qvd:
    enable: true
    directory: /var/lib/sensebridge/qvd
    table_name: Sessions
"#;

    let config = load_config_str(yaml).unwrap();

    let queue = &config.udp.user_events.queue;
    assert_eq!(queue.max_concurrent, 8);
    assert_eq!(queue.handler_timeout, Duration::from_secs(10));
    assert_eq!(queue.queue_full_log_throttle, Duration::from_secs(5));
    assert!(queue.rate_limit.enable);
    assert_eq!(queue.rate_limit.max_messages_per_minute, 100);

    assert_eq!(config.audit.queue.max_pending, 250);

    let influx = config.destinations.influxdb.unwrap();
    assert!(influx.enable);
    assert_eq!(influx.version, InfluxVersion::V2);
    assert_eq!(influx.buffering.write_frequency, Duration::from_secs(5));
    assert_eq!(influx.buffering.max_batch_size, 200);

    let qvd = config.destinations.qvd.unwrap();
    assert_eq!(qvd.table_name, "Sessions");
    assert_eq!(qvd.buffering.write_frequency, Duration::from_secs(20));
}

#[test]
fn test_invalid_listen_address_is_rejected() {
    let yaml = MINIMAL_CONFIG.replace("0.0.0.0:9997", "not-an-address");
    let result = load_config_str(&yaml);

    match result {
        Err(ConfigError::ValidationList(errors)) => {
            assert!(errors.iter().any(|e| e.contains("udp.user_events.listen")));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn test_zero_queue_sizes_are_rejected() {
    let yaml = r#"
udp:
  user_events:
    listen: "0.0.0.0:9997"
    queue:
      max_concurrent: 0
      max_size: 0
  log_events:
    listen: "0.0.0.0:9996"
audit:
  server:
    listen: "0.0.0.0:8761"
"#;

    match load_config_str(yaml) {
        Err(ConfigError::ValidationList(errors)) => {
            assert!(errors.iter().any(|e| e.contains("max_concurrent")));
            assert!(errors.iter().any(|e| e.contains("max_size")));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn test_backpressure_threshold_bounds() {
    let yaml = r#"
udp:
  user_events:
    listen: "0.0.0.0:9997"
    queue:
      backpressure_threshold_percent: 150
  log_events:
    listen: "0.0.0.0:9996"
audit:
  server:
    listen: "0.0.0.0:8761"
"#;

    match load_config_str(yaml) {
        Err(ConfigError::ValidationList(errors)) => {
            assert!(errors
                .iter()
                .any(|e| e.contains("backpressure_threshold_percent")));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn test_influx_v2_requires_org_bucket_token() {
    let yaml = r#"
udp:
  user_events:
    listen: "0.0.0.0:9997"
  log_events:
    listen: "0.0.0.0:9996"
audit:
  server:
    listen: "0.0.0.0:8761"
destinations:
  influxdb:
    enable: true
    version: v2
    url: http://localhost:8086
"#;

    match load_config_str(yaml) {
        Err(ConfigError::ValidationList(errors)) => {
            assert!(errors.iter().any(|e| e.contains("org is required")));
            assert!(errors.iter().any(|e| e.contains("bucket is required")));
            assert!(errors.iter().any(|e| e.contains("token is required")));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn test_influx_v1_requires_database() {
    let yaml = r#"
udp:
  user_events:
    listen: "0.0.0.0:9997"
  log_events:
    listen: "0.0.0.0:9996"
audit:
  server:
    listen: "0.0.0.0:8761"
destinations:
  influxdb:
    enable: true
    version: v1
    url: http://localhost:8086
"#;

    match load_config_str(yaml) {
        Err(ConfigError::ValidationList(errors)) => {
            assert!(errors.iter().any(|e| e.contains("database is required")));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn test_disabled_influx_is_not_validated() {
    let yaml = r#"
udp:
  user_events:
    listen: "0.0.0.0:9997"
  log_events:
    listen: "0.0.0.0:9996"
audit:
  server:
    listen: "0.0.0.0:8761"
destinations:
  influxdb:
    enable: false
    version: v2
    url: ""
"#;

    assert!(load_config_str(yaml).is_ok());
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SENSEBRIDGE_TEST_TOKEN", "expanded-secret");
    let yaml = r#"
udp:
  user_events:
    listen: "0.0.0.0:9997"
  log_events:
    listen: "0.0.0.0:9996"
audit:
  server:
    listen: "0.0.0.0:8761"
destinations:
  influxdb:
    enable: true
    version: v3
    url: http://localhost:8181
    database: sense
    token: $env{SENSEBRIDGE_TEST_TOKEN}
"#;

    let config = load_config_str(yaml).unwrap();
    std::env::remove_var("SENSEBRIDGE_TEST_TOKEN");

    let influx = config.destinations.influxdb.unwrap();
    assert_eq!(influx.token.as_deref(), Some("expanded-secret"));
}

#[test]
fn test_unset_env_var_is_reported() {
    let yaml = r#"
udp:
  user_events:
    listen: "0.0.0.0:9997"
  log_events:
    listen: "0.0.0.0:9996"
audit:
  server:
    listen: "0.0.0.0:8761"
destinations:
  influxdb:
    enable: true
    version: v3
    url: http://localhost:8181
    database: sense
    token: $env{SENSEBRIDGE_DEFINITELY_UNSET_VAR}
"#;

    match load_config_str(yaml) {
        Err(ConfigError::Validation(message)) => {
            assert!(message.contains("SENSEBRIDGE_DEFINITELY_UNSET_VAR"));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}
