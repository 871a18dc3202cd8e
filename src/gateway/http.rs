//! HTTP side of the gateway: reachability probe and message submission.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::GatewayConfig;

use super::parse::extract_message_id;
use super::GatewayError;

/// Result of the `/status` reachability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum HttpProbe {
    Healthy,
    /// Reachable but returned a non-success status
    Error(u16),
    /// Transport failure
    Unavailable(String),
}

impl HttpProbe {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HttpProbe::Healthy)
    }
}

/// Result of a single message submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResult {
    pub success: bool,
    pub status_code: u16,
    /// Raw response body
    pub response: String,
    /// Gateway-assigned message id, when extractable
    pub message_id: Option<String>,
}

/// Client for the gateway's HTTP interface.
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpApi {
    pub fn new(config: &GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .expect("reqwest client");

        Self {
            client,
            base_url: format!("http://{}:{}", config.host, config.http_port),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    /// Probe the gateway's HTTP status endpoint. Never returns an error;
    /// failures degrade to an unhealthy probe result.
    pub async fn probe_status(&self) -> HttpProbe {
        let url = format!("{}/status", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => HttpProbe::Healthy,
            Ok(response) => {
                debug!(status = %response.status(), "gateway http probe returned error status");
                HttpProbe::Error(response.status().as_u16())
            }
            Err(e) => {
                warn!(error = %e, "gateway http probe failed");
                HttpProbe::Unavailable(e.to_string())
            }
        }
    }

    /// Submit one message over the gateway's HTTP send endpoint.
    pub async fn send_message(
        &self,
        source: &str,
        destination: &str,
        content: &str,
    ) -> Result<SubmitResult, GatewayError> {
        let url = format!("{}/send", self.base_url);
        let form = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("to", destination),
            ("from", source),
            ("content", content),
        ];

        let response = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Connection(format!("http send: {e}")))?;

        let status_code = response.status().as_u16();
        let success = response.status().is_success();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Connection(format!("http send body: {e}")))?;

        let message_id = if success {
            extract_message_id(&body)
        } else {
            None
        };

        Ok(SubmitResult {
            success,
            status_code,
            response: body,
            message_id,
        })
    }
}
