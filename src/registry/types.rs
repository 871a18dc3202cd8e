//! Connector desired-state records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connector lifecycle status.
///
/// Local status is a cache of gateway truth. Terminal values
/// (started/bound/stopped/unbound/error) are only ever written by the
/// reconciler observing the gateway; `start`/`stop` write only the
/// transitional values. Unknown gateway-reported strings are rejected at the
/// parse boundary, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorStatus {
    Stopped,
    Starting,
    Started,
    Stopping,
    Bound,
    Unbound,
    Error,
}

impl ConnectorStatus {
    /// Wire/display name
    pub fn name(&self) -> &'static str {
        match self {
            ConnectorStatus::Stopped => "stopped",
            ConnectorStatus::Starting => "starting",
            ConnectorStatus::Started => "started",
            ConnectorStatus::Stopping => "stopping",
            ConnectorStatus::Bound => "bound",
            ConnectorStatus::Unbound => "unbound",
            ConnectorStatus::Error => "error",
        }
    }

    /// Parse a gateway-reported status string.
    ///
    /// The gateway only ever reports observed states; transitional values
    /// are local-only and are not accepted here.
    pub fn parse_observed(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stopped" => Some(ConnectorStatus::Stopped),
            "started" => Some(ConnectorStatus::Started),
            "bound" => Some(ConnectorStatus::Bound),
            "unbound" => Some(ConnectorStatus::Unbound),
            "error" => Some(ConnectorStatus::Error),
            _ => None,
        }
    }

    /// True for states only the reconciler may write.
    pub fn is_observed(&self) -> bool {
        !self.is_transitional()
    }

    /// True for the intermediate states written by start/stop commands.
    pub fn is_transitional(&self) -> bool {
        matches!(self, ConnectorStatus::Starting | ConnectorStatus::Stopping)
    }

    /// True when the connector has a live gateway session.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectorStatus::Started | ConnectorStatus::Bound)
    }

    /// Whether a start command is accepted from this state.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            ConnectorStatus::Stopped | ConnectorStatus::Unbound | ConnectorStatus::Error
        )
    }

    /// Whether a stop command is accepted from this state.
    pub fn can_stop(&self) -> bool {
        matches!(
            self,
            ConnectorStatus::Started | ConnectorStatus::Bound | ConnectorStatus::Starting
        )
    }
}

impl std::fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// SMPP bind type requested when the gateway connects the connector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindType {
    #[default]
    Transceiver,
    Transmitter,
    Receiver,
}

impl BindType {
    pub fn name(&self) -> &'static str {
        match self {
            BindType::Transceiver => "transceiver",
            BindType::Transmitter => "transmitter",
            BindType::Receiver => "receiver",
        }
    }
}

/// Connection parameters and protocol defaults for a connector.
///
/// These are the desired-state settings pushed to the gateway on creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Upstream SMSC host
    pub host: String,
    /// Upstream SMSC port
    pub port: u16,
    /// SMPP username (system_id at the SMSC)
    pub username: String,
    /// SMPP password
    pub password: String,
    /// Bind type
    #[serde(default)]
    pub bind_type: BindType,
    /// Submit throughput limit (messages/second, 0 = unlimited)
    #[serde(default)]
    pub submit_throughput: u32,
    /// Source address type-of-number
    #[serde(default)]
    pub src_ton: u8,
    /// Source address numbering-plan-indicator
    #[serde(default = "default_npi")]
    pub src_npi: u8,
    /// Destination address type-of-number
    #[serde(default = "default_ton")]
    pub dst_ton: u8,
    /// Destination address numbering-plan-indicator
    #[serde(default = "default_npi")]
    pub dst_npi: u8,
    /// Message validity period (gateway format), if any
    #[serde(default)]
    pub validity_period: Option<String>,
}

fn default_ton() -> u8 {
    1
}

fn default_npi() -> u8 {
    1
}

/// Message counters reported for a connector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorCounters {
    pub sent: u64,
    pub received: u64,
    pub failed: u64,
    /// Successful session establishments
    pub connection_count: u64,
    pub error_count: u64,
}

/// A connector desired-state record.
///
/// `cid` is globally unique and immutable after creation. Each connector is
/// owned by exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connector {
    /// Unique short code identifying the connector at the gateway
    pub cid: String,
    /// Owning tenant
    pub tenant: String,
    /// Connection parameters
    pub config: ConnectorConfig,
    /// Lifecycle status (cache of gateway truth, see [`ConnectorStatus`])
    pub status: ConnectorStatus,
    /// Counters
    pub counters: ConnectorCounters,
    /// Last successful session establishment
    pub last_connected: Option<DateTime<Utc>>,
    /// Last error reported by the gateway
    pub last_error: Option<String>,
    /// Record creation time
    pub created_at: DateTime<Utc>,
    /// Last local modification time
    pub updated_at: DateTime<Utc>,
}

impl Connector {
    /// Create a new desired-state record. Starts stopped.
    pub fn new(cid: impl Into<String>, tenant: impl Into<String>, config: ConnectorConfig) -> Self {
        let now = Utc::now();
        Self {
            cid: cid.into(),
            tenant: tenant.into(),
            config,
            status: ConnectorStatus::Stopped,
            counters: ConnectorCounters::default(),
            last_connected: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Log severity for connector events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Append-only operational log entry for a connector.
///
/// Entries are write-once and never mutated; they exist for operational
/// audit, not as state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorLog {
    pub cid: String,
    pub level: LogLevel,
    pub event_type: String,
    pub message: String,
    /// Structured event payload
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ConnectorLog {
    pub fn new(
        cid: impl Into<String>,
        level: LogLevel,
        event_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            cid: cid.into(),
            level,
            event_type: event_type.into(),
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn test_status_parse_observed() {
        assert_eq!(
            ConnectorStatus::parse_observed("started"),
            Some(ConnectorStatus::Started)
        );
        assert_eq!(
            ConnectorStatus::parse_observed("BOUND"),
            Some(ConnectorStatus::Bound)
        );
        assert_eq!(
            ConnectorStatus::parse_observed(" stopped "),
            Some(ConnectorStatus::Stopped)
        );
        // Transitional values are local-only
        assert_eq!(ConnectorStatus::parse_observed("starting"), None);
        assert_eq!(ConnectorStatus::parse_observed("stopping"), None);
        assert_eq!(ConnectorStatus::parse_observed("banana"), None);
        assert_eq!(ConnectorStatus::parse_observed(""), None);
    }

    #[test]
    fn test_status_transitional() {
        assert!(ConnectorStatus::Starting.is_transitional());
        assert!(ConnectorStatus::Stopping.is_transitional());
        assert!(!ConnectorStatus::Started.is_transitional());
        assert!(ConnectorStatus::Stopped.is_observed());
        assert!(!ConnectorStatus::Starting.is_observed());
    }

    #[test]
    fn test_status_connected() {
        assert!(ConnectorStatus::Started.is_connected());
        assert!(ConnectorStatus::Bound.is_connected());
        assert!(!ConnectorStatus::Stopped.is_connected());
        assert!(!ConnectorStatus::Starting.is_connected());
    }

    #[test]
    fn test_start_stop_preconditions() {
        assert!(ConnectorStatus::Stopped.can_start());
        assert!(ConnectorStatus::Unbound.can_start());
        // Retry out of error is allowed
        assert!(ConnectorStatus::Error.can_start());
        assert!(!ConnectorStatus::Started.can_start());

        assert!(ConnectorStatus::Started.can_stop());
        assert!(ConnectorStatus::Bound.can_stop());
        assert!(ConnectorStatus::Starting.can_stop());
        assert!(!ConnectorStatus::Stopped.can_stop());
    }

    #[test]
    fn test_new_connector_starts_stopped() {
        let c = Connector::new("conn1", "tenant1", test_config());
        assert_eq!(c.status, ConnectorStatus::Stopped);
        assert_eq!(c.counters, ConnectorCounters::default());
        assert!(c.last_connected.is_none());
    }

    #[test]
    fn test_log_entry_with_data() {
        let log = ConnectorLog::new("conn1", LogLevel::Warn, "drift", "status drift corrected")
            .with_data(serde_json::json!({"local": "started", "gateway": "stopped"}));
        assert_eq!(log.cid, "conn1");
        assert!(log.data.is_some());
    }

    pub(crate) fn test_config() -> ConnectorConfig {
        ConnectorConfig {
            host: "smsc.example.net".into(),
            port: 2775,
            username: "smppclient".into(),
            password: "password".into(),
            bind_type: BindType::Transceiver,
            submit_throughput: 10,
            src_ton: 0,
            src_npi: 1,
            dst_ton: 1,
            dst_npi: 1,
            validity_period: None,
        }
    }
}
