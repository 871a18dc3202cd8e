//! Gateway command client.
//!
//! All control of the external gateway goes through its administrative
//! Telnet interface: a line-oriented, authenticated protocol with no
//! request/response correlation, so exactly one command may be in flight
//! per session. [`session::JcliSession`] owns the one persistent connection
//! as an actor task; [`GatewayClient`] layers typed operations on top of the
//! raw command channel.

pub mod health;
pub mod http;
pub mod mock;
pub mod parse;
pub mod session;

use async_trait::async_trait;
use std::sync::Arc;

use crate::registry::ConnectorConfig;

use parse::{
    parse_connector_list, parse_connector_status, parse_route_list, parse_stats,
    ConnectorListing, ConnectorStatusBlock, GatewayStats, RouteListing,
};

/// Gateway interaction errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Login handshake failed. Terminal for the connection attempt; the
    /// caller decides whether to retry.
    #[error("gateway authentication failed: {0}")]
    Authentication(String),

    /// Transport-level failure. The session reconnects transparently on
    /// the next command.
    #[error("gateway connection failed: {0}")]
    Connection(String),

    /// A command was rejected or produced an unexpected response
    #[error("gateway command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    /// The response sentinel did not appear within the bounded wait
    #[error("gateway command '{command}' timed out")]
    Timeout { command: String },

    /// The session actor has shut down
    #[error("gateway command channel closed")]
    ChannelClosed,
}

/// Serialized command channel to the gateway admin interface.
///
/// Implementations enforce one command in flight at a time; concurrent
/// callers queue.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Send one command line and return the raw response block.
    async fn execute(&self, command: &str) -> Result<String, GatewayError>;

    /// Whether the underlying session is currently connected.
    async fn is_connected(&self) -> bool;
}

/// Typed operations over the raw command channel.
#[derive(Clone)]
pub struct GatewayClient {
    channel: Arc<dyn CommandChannel>,
}

impl GatewayClient {
    pub fn new(channel: Arc<dyn CommandChannel>) -> Self {
        Self { channel }
    }

    /// Raw command escape hatch
    pub async fn execute(&self, command: &str) -> Result<String, GatewayError> {
        self.channel.execute(command).await
    }

    pub async fn is_connected(&self) -> bool {
        self.channel.is_connected().await
    }

    /// List all connectors known to the gateway.
    pub async fn list_connectors(&self) -> Result<Vec<ConnectorListing>, GatewayError> {
        let response = self.channel.execute("smppccm -l").await?;
        Ok(parse_connector_list(&response))
    }

    /// Fetch one connector's status block.
    pub async fn connector_status(&self, cid: &str) -> Result<ConnectorStatusBlock, GatewayError> {
        let response = self.channel.execute(&format!("smppccm -s {cid}")).await?;
        Ok(parse_connector_status(&response, cid))
    }

    /// Start a connector by id.
    pub async fn start_connector(&self, cid: &str) -> Result<(), GatewayError> {
        let command = format!("smppccm -1 {cid}");
        let response = self.channel.execute(&command).await?;
        expect_ack(&command, &response, "Successfully started")
    }

    /// Stop a connector by id.
    pub async fn stop_connector(&self, cid: &str) -> Result<(), GatewayError> {
        let command = format!("smppccm -0 {cid}");
        let response = self.channel.execute(&command).await?;
        expect_ack(&command, &response, "Successfully stopped")
    }

    /// Create a connector at the gateway with the given parameters.
    pub async fn create_connector(
        &self,
        cid: &str,
        config: &ConnectorConfig,
    ) -> Result<(), GatewayError> {
        let command = add_connector_command(cid, config);
        let response = self.channel.execute(&command).await?;
        expect_ack(&command, &response, "Successfully added")
    }

    /// Remove a connector from the gateway.
    pub async fn remove_connector(&self, cid: &str) -> Result<(), GatewayError> {
        let command = format!("smppccm -r {cid}");
        let response = self.channel.execute(&command).await?;
        expect_ack(&command, &response, "Successfully removed")
    }

    /// List the gateway's route table (informational; local records stay
    /// authoritative for evaluation).
    pub async fn list_routes(&self) -> Result<Vec<RouteListing>, GatewayError> {
        let response = self.channel.execute("mtrouter -l").await?;
        Ok(parse_route_list(&response))
    }

    /// Aggregate system statistics.
    pub async fn system_stats(&self) -> Result<GatewayStats, GatewayError> {
        let response = self.channel.execute("stats --all").await?;
        Ok(parse_stats(&response))
    }
}

/// Build the connector creation command from config keyword parameters.
fn add_connector_command(cid: &str, config: &ConnectorConfig) -> String {
    let mut command = format!(
        "smppccm -a --cid {} --host {} --port {} --username {} --password {} --bind_type {}",
        cid,
        config.host,
        config.port,
        config.username,
        config.password,
        config.bind_type.name(),
    );

    command.push_str(&format!(
        " --submit_throughput {} --src_ton {} --src_npi {} --dst_ton {} --dst_npi {}",
        config.submit_throughput, config.src_ton, config.src_npi, config.dst_ton, config.dst_npi,
    ));

    if let Some(validity) = &config.validity_period {
        command.push_str(&format!(" --validity_period {validity}"));
    }

    command
}

fn expect_ack(command: &str, response: &str, marker: &str) -> Result<(), GatewayError> {
    if response.contains(marker) {
        Ok(())
    } else {
        Err(GatewayError::Command {
            command: command.to_string(),
            reason: response.trim().lines().next().unwrap_or("empty response").to_string(),
        })
    }
}
