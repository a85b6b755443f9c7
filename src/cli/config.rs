use std::fs;
use std::path::PathBuf;

const SAMPLE_CONFIG: &str = r#"# sensebridge configuration
#
# Values support $env{VAR_NAME} expansion for secrets.

udp:
  # Qlik Sense proxy session events
  user_events:
    listen: "0.0.0.0:9997"
    queue:
      max_concurrent: 4
      max_size: 1000
      backpressure_threshold_percent: 80
      max_message_size_bytes: 65507
      handler_timeout: 30s
      queue_full_log_throttle: 10s
      rate_limit:
        enable: true
        max_messages_per_minute: 1200
        violation_log_throttle: 30s

  # Qlik Sense engine/proxy/scheduler log events
  log_events:
    listen: "0.0.0.0:9996"
    queue:
      max_concurrent: 4
      max_size: 2000
      backpressure_threshold_percent: 80
      rate_limit:
        enable: false

audit:
  server:
    listen: "0.0.0.0:8761"
  queue:
    max_pending: 5000
    rate_limit:
      enable: true
      max_messages_per_minute: 3000
      violation_log_throttle: 30s

destinations:
  influxdb:
    enable: false
    version: v2
    url: http://localhost:8086
    org: myorg
    bucket: sensebridge
    token: $env{INFLUXDB_TOKEN}
    timeout: 15s
    max_retries: 3
    retry_interval: 5s
    buffering:
      write_frequency: 20s
      max_batch_size: 1000

  parquet:
    enable: false
    directory: ~/sensebridge/parquet
    file_prefix: audit-events
    buffering:
      write_frequency: 60s
      max_batch_size: 5000

  qvd:
    enable: false
    directory: ~/sensebridge/qvd-staging
    table_name: AuditEvents
    buffering:
      write_frequency: 60s
      max_batch_size: 5000
"#;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    if stdout {
        print!("{SAMPLE_CONFIG}");
        return Ok(());
    }

    let config_path = default_config_path();

    if config_path.exists() {
        eprintln!("Error: Config file already exists at {}", config_path.display());
        eprintln!("Remove it first or use --stdout to print the config");
        std::process::exit(1);
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, SAMPLE_CONFIG)?;

    println!("Wrote sample config to {}", config_path.display());
    Ok(())
}

fn default_config_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".config/sensebridge/config.yml"),
        None => PathBuf::from("/etc/sensebridge/config.yml"),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::parse::load_config_str;

    #[test]
    fn test_sample_config_parses_and_validates() {
        std::env::set_var("INFLUXDB_TOKEN", "test-token");
        let config = load_config_str(super::SAMPLE_CONFIG).unwrap();
        std::env::remove_var("INFLUXDB_TOKEN");

        assert_eq!(config.udp.user_events.listen, "0.0.0.0:9997");
        assert_eq!(config.udp.user_events.queue.max_concurrent, 4);
        assert!(config.udp.user_events.queue.rate_limit.enable);
        assert_eq!(config.audit.queue.max_pending, 5000);

        let influx = config.destinations.influxdb.unwrap();
        assert!(!influx.enable);
        assert_eq!(influx.token.as_deref(), Some("test-token"));
    }
}
