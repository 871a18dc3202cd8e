use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration for connectord
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Connection parameters for the external gateway
    pub gateway: GatewayConfig,

    /// Reconciliation loop settings
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Admin API configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Cache settings for gateway listings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Gateway connection configuration.
///
/// The gateway exposes two surfaces: the administrative Telnet interface
/// (jcli) used for all control commands, and an HTTP interface used for the
/// reachability probe and single-message submission.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway hostname or IP
    pub host: String,

    /// Telnet (jcli) port
    #[serde(default = "default_telnet_port")]
    pub telnet_port: u16,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// jcli username
    pub username: String,

    /// jcli password
    pub password: String,

    /// Timeout for the TCP connect + login handshake
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout waiting for a command's response sentinel
    #[serde(default = "default_response_timeout", with = "humantime_serde")]
    pub response_timeout: Duration,

    /// Timeout for HTTP probe/submit calls
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub http_timeout: Duration,
}

/// Reconciliation loop configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// Polling interval between reconciliation passes
    #[serde(default = "default_reconcile_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Maximum backoff multiplier applied to the interval after
    /// consecutive poll failures
    #[serde(default = "default_max_backoff_multiplier")]
    pub max_backoff_multiplier: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: default_reconcile_interval(),
            max_backoff_multiplier: default_max_backoff_multiplier(),
        }
    }
}

/// Admin API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Bind address for the admin HTTP server
    #[serde(default = "default_admin_address")]
    pub address: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            address: default_admin_address(),
        }
    }
}

/// Cache configuration for gateway listings
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for cached gateway listings
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g. "info", "connectord=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_telnet_port() -> u16 {
    8990
}

fn default_http_port() -> u16 {
    1401
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_reconcile_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_max_backoff_multiplier() -> u32 {
    8
}

fn default_admin_address() -> SocketAddr {
    "127.0.0.1:8870".parse().expect("valid default address")
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_log_level() -> String {
    "info".to_string()
}
