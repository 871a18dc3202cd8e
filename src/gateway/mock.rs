//! Scripted gateway for tests.
//!
//! Implements [`CommandChannel`] without a network: canned responses per
//! command prefix, failure injection, and a record of every issued command.
//! The built-in behavior mimics a well-behaved gateway so registry and
//! reconciler tests only script the deviations they care about.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{CommandChannel, GatewayError};

#[derive(Default)]
struct Script {
    /// Prefix-matched response overrides, first match wins
    responses: Vec<(String, String)>,
    /// Prefix-matched failure injections, checked before responses
    failures: Vec<(String, GatewayError)>,
}

/// In-memory scripted gateway.
pub struct MockGateway {
    script: Mutex<Script>,
    /// Gateway-side connector statuses rendered into `smppccm -l`
    statuses: Mutex<BTreeMap<String, String>>,
    issued: Mutex<Vec<String>>,
    connected: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Script::default()),
            statuses: Mutex::new(BTreeMap::new()),
            issued: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    /// Script a response for commands starting with `prefix`.
    pub fn respond(&self, prefix: &str, response: &str) {
        self.script
            .lock()
            .unwrap()
            .responses
            .push((prefix.to_string(), response.to_string()));
    }

    /// Inject a failure for commands starting with `prefix`.
    pub fn fail(&self, prefix: &str, error: GatewayError) {
        self.script
            .lock()
            .unwrap()
            .failures
            .push((prefix.to_string(), error));
    }

    /// Set the gateway-side status reported for a connector.
    pub fn set_status(&self, cid: &str, status: &str) {
        self.statuses
            .lock()
            .unwrap()
            .insert(cid.to_string(), status.to_string());
    }

    /// Remove a connector from the gateway-side listing.
    pub fn clear_status(&self, cid: &str) {
        self.statuses.lock().unwrap().remove(cid);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Every command issued so far, in order.
    pub fn issued_commands(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }

    fn render_listing(&self) -> String {
        let statuses = self.statuses.lock().unwrap();
        let mut out = String::from("#Connector id  Status  Session  Details\n");
        for (cid, status) in statuses.iter() {
            let session = if status == "bound" { "BOUND_TRX" } else { "NONE" };
            out.push_str(&format!("{cid} {status} {session} 127.0.0.1:2775\n"));
        }
        out
    }

    fn builtin_response(&self, command: &str) -> String {
        if command.starts_with("smppccm -l") {
            self.render_listing()
        } else if command.starts_with("smppccm -a") {
            "Successfully added connector".to_string()
        } else if command.starts_with("smppccm -1") {
            "Successfully started connector".to_string()
        } else if command.starts_with("smppccm -0") {
            "Successfully stopped connector".to_string()
        } else if command.starts_with("smppccm -r") {
            "Successfully removed connector".to_string()
        } else if command.starts_with("smppccm -s") {
            let cid = command.rsplit(' ').next().unwrap_or("");
            let status = self
                .statuses
                .lock()
                .unwrap()
                .get(cid)
                .cloned()
                .unwrap_or_else(|| "stopped".to_string());
            format!("Status: {status}\nSession State: NONE\n")
        } else if command.starts_with("stats --all") {
            "total_messages_sent: 0\ntotal_messages_received: 0\nuptime: 1\n".to_string()
        } else if command.starts_with("mtrouter -l") {
            "#Order Type Connector Rate Filters\n".to_string()
        } else {
            "Unknown command".to_string()
        }
    }
}

#[async_trait]
impl CommandChannel for MockGateway {
    async fn execute(&self, command: &str) -> Result<String, GatewayError> {
        self.issued.lock().unwrap().push(command.to_string());

        if !self.connected.load(Ordering::SeqCst) {
            return Err(GatewayError::Connection("mock gateway offline".into()));
        }

        let script = self.script.lock().unwrap();
        if let Some((_, error)) = script
            .failures
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        {
            return Err(error.clone());
        }
        if let Some((_, response)) = script
            .responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        {
            return Ok(response.clone());
        }
        drop(script);

        Ok(self.builtin_response(command))
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayClient;
    use crate::registry::ConnectorStatus;

    #[tokio::test]
    async fn test_builtin_listing_reflects_statuses() {
        let mock = MockGateway::new();
        mock.set_status("conn1", "started");
        mock.set_status("conn2", "stopped");

        let client = GatewayClient::new(mock.clone());
        let listings = client.list_connectors().await.unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].cid, "conn1");
        assert_eq!(listings[0].status, ConnectorStatus::Started);
        assert_eq!(listings[1].status, ConnectorStatus::Stopped);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let mock = MockGateway::new();
        mock.fail(
            "smppccm -1",
            GatewayError::Command {
                command: "smppccm -1 conn1".into(),
                reason: "scripted".into(),
            },
        );

        let client = GatewayClient::new(mock.clone());
        assert!(client.start_connector("conn1").await.is_err());
        // Other commands are unaffected
        assert!(client.stop_connector("conn1").await.is_ok());
    }

    #[tokio::test]
    async fn test_commands_recorded() {
        let mock = MockGateway::new();
        let client = GatewayClient::new(mock.clone());
        client.system_stats().await.unwrap();
        client.start_connector("conn1").await.unwrap();

        let issued = mock.issued_commands();
        assert_eq!(issued, vec!["stats --all", "smppccm -1 conn1"]);
    }

    #[tokio::test]
    async fn test_offline_mock_fails_with_connection_error() {
        let mock = MockGateway::new();
        mock.set_connected(false);

        let client = GatewayClient::new(mock.clone());
        let err = client.system_stats().await.unwrap_err();
        assert!(matches!(err, GatewayError::Connection(_)));
    }
}
