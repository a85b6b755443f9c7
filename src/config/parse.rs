use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    load_config_str(&yaml_string)
}

/// Parse and validate a config document.
///
/// Environment variables are expanded before parsing; any `$env{...}`
/// marker still present afterwards is reported as a validation error.
pub fn load_config_str(yaml_string: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml_string);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;
    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Reports environment variables referenced by the config but not set.
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut unexpanded: Vec<String> = re
        .captures_iter(yaml_string)
        .map(|cap| cap.get(1).unwrap().as_str().to_string())
        .collect();

    if unexpanded.is_empty() {
        return Ok(());
    }

    unexpanded.sort();
    unexpanded.dedup();

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         Set them (e.g. export {}=...) or replace the markers with literal values",
        unexpanded.join(", "),
        unexpanded[0]
    )))
}

fn expand_paths(config: &mut Config) {
    if let Some(parquet) = &mut config.destinations.parquet {
        parquet.directory = expand_tilde(&parquet.directory);
    }
    if let Some(qvd) = &mut config.destinations.qvd {
        qvd.directory = expand_tilde(&qvd.directory);
    }
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    validate_listen_addr(&config.udp.user_events.listen, "udp.user_events.listen", &mut errors);
    validate_listen_addr(&config.udp.log_events.listen, "udp.log_events.listen", &mut errors);
    validate_queue(&config.udp.user_events.queue, "udp.user_events.queue", &mut errors);
    validate_queue(&config.udp.log_events.queue, "udp.log_events.queue", &mut errors);

    validate_listen_addr(&config.audit.server.listen, "audit.server.listen", &mut errors);
    if config.audit.queue.max_pending == 0 {
        errors.push("audit.queue.max_pending must be at least 1".to_string());
    }
    validate_rate_limit(&config.audit.queue.rate_limit, "audit.queue.rate_limit", &mut errors);

    if let Some(influx) = &config.destinations.influxdb {
        if influx.enable {
            validate_influx(influx, &mut errors);
        }
    }
    if let Some(parquet) = &config.destinations.parquet {
        if parquet.enable {
            if parquet.directory.as_os_str().is_empty() {
                errors.push("destinations.parquet.directory must not be empty".to_string());
            }
            validate_buffering(&parquet.buffering, "destinations.parquet.buffering", &mut errors);
        }
    }
    if let Some(qvd) = &config.destinations.qvd {
        if qvd.enable {
            if qvd.directory.as_os_str().is_empty() {
                errors.push("destinations.qvd.directory must not be empty".to_string());
            }
            if qvd.table_name.is_empty() {
                errors.push("destinations.qvd.table_name must not be empty".to_string());
            }
            validate_buffering(&qvd.buffering, "destinations.qvd.buffering", &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

fn validate_listen_addr(listen: &str, context: &str, errors: &mut Vec<String>) {
    if listen.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "{context}: '{listen}' is not a valid socket address (expected host:port)"
        ));
    }
}

fn validate_queue(queue: &UdpQueueSettings, context: &str, errors: &mut Vec<String>) {
    if queue.max_concurrent == 0 {
        errors.push(format!("{context}.max_concurrent must be at least 1"));
    }
    if queue.max_size == 0 {
        errors.push(format!("{context}.max_size must be at least 1"));
    }
    if queue.backpressure_threshold_percent == 0 || queue.backpressure_threshold_percent > 100 {
        errors.push(format!(
            "{context}.backpressure_threshold_percent must be between 1 and 100"
        ));
    }
    if queue.max_message_size_bytes == 0 || queue.max_message_size_bytes > 65507 {
        errors.push(format!(
            "{context}.max_message_size_bytes must be between 1 and 65507"
        ));
    }
    validate_rate_limit(&queue.rate_limit, &format!("{context}.rate_limit"), errors);
}

fn validate_rate_limit(rate_limit: &RateLimitSettings, context: &str, errors: &mut Vec<String>) {
    if rate_limit.enable && rate_limit.max_messages_per_minute == 0 {
        errors.push(format!(
            "{context}.max_messages_per_minute must be at least 1 when rate limiting is enabled"
        ));
    }
}

fn validate_buffering(buffering: &BufferingSettings, context: &str, errors: &mut Vec<String>) {
    if buffering.max_batch_size == 0 {
        errors.push(format!("{context}.max_batch_size must be at least 1"));
    }
}

fn validate_influx(influx: &InfluxConfig, errors: &mut Vec<String>) {
    if !influx.url.starts_with("http://") && !influx.url.starts_with("https://") {
        errors.push(format!(
            "destinations.influxdb.url must start with http:// or https://, got '{}'",
            influx.url
        ));
    }

    match influx.version {
        InfluxVersion::V1 => {
            if influx.database.is_none() {
                errors.push("destinations.influxdb.database is required for version v1".to_string());
            }
        }
        InfluxVersion::V2 => {
            if influx.org.is_none() {
                errors.push("destinations.influxdb.org is required for version v2".to_string());
            }
            if influx.bucket.is_none() {
                errors.push("destinations.influxdb.bucket is required for version v2".to_string());
            }
            if influx.token.is_none() {
                errors.push("destinations.influxdb.token is required for version v2".to_string());
            }
        }
        InfluxVersion::V3 => {
            if influx.database.is_none() {
                errors.push("destinations.influxdb.database is required for version v3".to_string());
            }
            if influx.token.is_none() {
                errors.push("destinations.influxdb.token is required for version v3".to_string());
            }
        }
    }

    validate_buffering(&influx.buffering, "destinations.influxdb.buffering", errors);
}
