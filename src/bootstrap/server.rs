//! Daemon assembly.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::admin::{AdminServer, AdminState};
use crate::config::Config;
use crate::events::EventBus;
use crate::gateway::health::HealthChecker;
use crate::gateway::http::HttpApi;
use crate::gateway::session::JcliSession;
use crate::gateway::GatewayClient;
use crate::registry::{ConnectorRegistry, MemoryStore};
use crate::sync::Reconciler;

/// The connectord daemon.
///
/// Components:
/// - Gateway session actor: one Telnet admin session, commands serialized
/// - HTTP client: gateway reachability probe and message submission
/// - Registry: desired-state records and lifecycle orchestration
/// - Reconciler: periodic gateway polling and drift correction
/// - Admin server: the REST surface over all of the above
pub struct Server {
    config: Config,
    cancel: CancellationToken,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the daemon until SIGINT/SIGTERM.
    pub async fn run(self) -> Result<()> {
        let channel = JcliSession::spawn(self.config.gateway.clone());
        let gateway = GatewayClient::new(Arc::new(channel));
        let http_api = HttpApi::new(&self.config.gateway);
        let health = HealthChecker::new(gateway.clone(), http_api.clone());

        let events = EventBus::new(256);
        let registry = ConnectorRegistry::new(
            MemoryStore::new(),
            gateway,
            events.clone(),
            &self.config.cache,
        );

        let reconciler = Reconciler::new(registry.clone(), events.clone(), &self.config.reconciler)
            .spawn(self.cancel.clone());

        let state = AdminState::new(registry, health, http_api, events, reconciler);
        let admin = AdminServer::new(&self.config.admin, state, self.cancel.clone());

        let cancel = self.cancel.clone();
        let admin_handle = tokio::spawn(async move {
            if let Err(e) = admin.run().await {
                error!(error = %e, "admin server failed");
                cancel.cancel();
            }
        });

        wait_for_signal().await;
        info!("shutdown signal received");
        self.cancel.cancel();

        let _ = admin_handle.await;
        info!("connectord stopped");
        Ok(())
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
