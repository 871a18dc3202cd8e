//! Aggregate gateway health.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::http::{HttpApi, HttpProbe};
use super::parse::GatewayStats;
use super::GatewayClient;

/// Aggregate health verdict with its constituent signals
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Single aggregate verdict: command channel connected AND http probe
    /// healthy
    pub healthy: bool,
    /// Command channel connectivity
    pub telnet: &'static str,
    /// HTTP probe result
    pub http_api: HttpProbe,
    /// Latest system stats; empty when the stats query failed
    pub stats: GatewayStats,
    pub last_check: DateTime<Utc>,
}

/// Combines the command channel, the HTTP probe and system stats into one
/// health verdict.
#[derive(Clone)]
pub struct HealthChecker {
    client: GatewayClient,
    http: HttpApi,
}

impl HealthChecker {
    pub fn new(client: GatewayClient, http: HttpApi) -> Self {
        Self { client, http }
    }

    /// Run a health check. Never fails; individual signal failures degrade
    /// the report instead.
    pub async fn check(&self) -> HealthReport {
        let telnet_connected = self.client.is_connected().await;
        let http_api = self.http.probe_status().await;

        // A failed stats query degrades to an empty map, it does not flip
        // the verdict on its own.
        let stats = self.client.system_stats().await.unwrap_or_default();

        HealthReport {
            healthy: telnet_connected && http_api.is_healthy(),
            telnet: if telnet_connected {
                "connected"
            } else {
                "disconnected"
            },
            http_api,
            stats,
            last_check: Utc::now(),
        }
    }
}
