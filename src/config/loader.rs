use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::types::Config;

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(yaml).context("failed to parse YAML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }

        if self.gateway.username.is_empty() {
            anyhow::bail!("gateway.username must not be empty");
        }

        if self.gateway.telnet_port == 0 {
            anyhow::bail!("gateway.telnet_port must not be zero");
        }

        if self.gateway.response_timeout < Duration::from_millis(100) {
            anyhow::bail!("gateway.response_timeout must be at least 100ms");
        }

        if self.reconciler.interval < Duration::from_secs(1) {
            anyhow::bail!("reconciler.interval must be at least 1s");
        }

        if self.reconciler.max_backoff_multiplier == 0 {
            anyhow::bail!("reconciler.max_backoff_multiplier must be at least 1");
        }

        info!("configuration validated successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
gateway:
  host: 127.0.0.1
  username: jcliadmin
  password: jclipwd
"#;

    #[test]
    fn test_minimal_config() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.telnet_port, 8990);
        assert_eq!(config.gateway.http_port, 1401);
        assert_eq!(config.reconciler.interval, Duration::from_secs(30));
        assert_eq!(config.cache.ttl, Duration::from_secs(30));
        assert!(!config.telemetry.json_logs);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
gateway:
  host: gw.example.net
  telnet_port: 8991
  http_port: 1402
  username: admin
  password: secret
  response_timeout: 3s
reconciler:
  interval: 10s
  max_backoff_multiplier: 4
admin:
  address: 0.0.0.0:9000
cache:
  ttl: 5s
telemetry:
  log_level: debug
  json_logs: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.gateway.telnet_port, 8991);
        assert_eq!(config.gateway.response_timeout, Duration::from_secs(3));
        assert_eq!(config.reconciler.interval, Duration::from_secs(10));
        assert_eq!(config.reconciler.max_backoff_multiplier, 4);
        assert_eq!(config.admin.address.port(), 9000);
        assert_eq!(config.cache.ttl, Duration::from_secs(5));
        assert!(config.telemetry.json_logs);
    }

    #[test]
    fn test_missing_gateway_section() {
        assert!(Config::from_yaml("reconciler:\n  interval: 10s\n").is_err());
    }

    #[test]
    fn test_empty_host_rejected() {
        let yaml = r#"
gateway:
  host: ""
  username: admin
  password: secret
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_too_short_interval_rejected() {
        let yaml = r#"
gateway:
  host: 127.0.0.1
  username: admin
  password: secret
reconciler:
  interval: 100ms
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }
}
