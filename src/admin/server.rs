//! Admin HTTP server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AdminConfig;
use crate::events::EventBus;
use crate::gateway::health::HealthChecker;
use crate::gateway::http::HttpApi;
use crate::registry::ConnectorRegistry;
use crate::sync::ReconcilerHandle;

use super::handlers::{
    connector_logs_handler, create_connector_handler, create_filter_handler, create_route_handler,
    delete_connector_handler, delete_filter_handler, delete_route_handler, gateway_routes_handler,
    get_connector_handler, health_handler, list_connectors_handler, list_filters_handler,
    list_routes_handler, live_handler, metrics_handler, ready_handler, send_message_handler,
    start_connector_handler, stats_handler, stop_connector_handler, test_route_handler,
    update_connector_handler, update_filter_handler, update_route_handler,
};

/// Admin server state, shared across handlers.
pub struct AdminState {
    start_time: Instant,
    pub registry: ConnectorRegistry,
    pub health: HealthChecker,
    pub http_api: HttpApi,
    pub events: Arc<EventBus>,
    pub reconciler: ReconcilerHandle,
}

impl AdminState {
    pub fn new(
        registry: ConnectorRegistry,
        health: HealthChecker,
        http_api: HttpApi,
        events: Arc<EventBus>,
        reconciler: ReconcilerHandle,
    ) -> Arc<Self> {
        crate::telemetry::metrics::register();
        Arc::new(Self {
            start_time: Instant::now(),
            registry,
            health,
            http_api,
            events,
            reconciler,
        })
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Build the admin router.
pub fn build_router(state: Arc<AdminState>) -> Router {
    Router::new()
        // Kubernetes-style health endpoints
        .route("/healthz", get(health_handler))
        .route("/livez", get(live_handler))
        .route("/readyz", get(ready_handler))
        // Metrics and stats
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        // Connector lifecycle
        .route(
            "/tenants/{tenant}/connectors",
            get(list_connectors_handler).post(create_connector_handler),
        )
        .route(
            "/tenants/{tenant}/connectors/{cid}",
            get(get_connector_handler)
                .put(update_connector_handler)
                .delete(delete_connector_handler),
        )
        .route(
            "/tenants/{tenant}/connectors/{cid}/start",
            post(start_connector_handler),
        )
        .route(
            "/tenants/{tenant}/connectors/{cid}/stop",
            post(stop_connector_handler),
        )
        .route(
            "/tenants/{tenant}/connectors/{cid}/logs",
            get(connector_logs_handler),
        )
        // Routing rules
        .route(
            "/tenants/{tenant}/routes",
            get(list_routes_handler).post(create_route_handler),
        )
        .route("/tenants/{tenant}/routes/test", post(test_route_handler))
        .route(
            "/tenants/{tenant}/routes/{order}",
            put(update_route_handler).delete(delete_route_handler),
        )
        // Filters
        .route(
            "/tenants/{tenant}/filters",
            get(list_filters_handler).post(create_filter_handler),
        )
        .route(
            "/tenants/{tenant}/filters/{fid}",
            put(update_filter_handler).delete(delete_filter_handler),
        )
        // Gateway passthrough
        .route("/messages/send", post(send_message_handler))
        .route("/gateway/routes", get(gateway_routes_handler))
        .with_state(state)
}

/// Admin HTTP server.
pub struct AdminServer {
    config: AdminConfig,
    state: Arc<AdminState>,
    cancel: CancellationToken,
}

impl AdminServer {
    pub fn new(config: &AdminConfig, state: Arc<AdminState>, cancel: CancellationToken) -> Self {
        Self {
            config: config.clone(),
            state,
            cancel,
        }
    }

    /// Run the admin server until shutdown.
    pub async fn run(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        let addr = self.config.address;

        info!(address = %addr, "starting admin server");

        let listener = TcpListener::bind(addr).await?;
        let cancel = self.cancel;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                info!("admin server shutting down");
            })
            .await?;

        Ok(())
    }
}
