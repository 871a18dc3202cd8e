//! Admin API handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};

use crate::gateway::parse::GatewayStats;
use crate::registry::{Connector, ConnectorConfig, RegistryError};
use crate::routing::{Filter, FilterType, MessageContext, Route, RouteType, RoutingError};

use super::AdminState;

/// API error with an HTTP status derived from the registry error kind.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match &err {
            RegistryError::DuplicateConnector { .. }
            | RegistryError::DuplicateRoute { .. }
            | RegistryError::DuplicateFilter { .. }
            | RegistryError::InvalidTransition { .. } => StatusCode::CONFLICT,
            RegistryError::ConnectorNotFound { .. }
            | RegistryError::RouteNotFound { .. }
            | RegistryError::FilterNotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::Gateway(_) => StatusCode::BAD_GATEWAY,
            RegistryError::FilterConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RegistryError::Routing(RoutingError::NoRouteMatched) => StatusCode::NOT_FOUND,
            RegistryError::Routing(RoutingError::DanglingConnector { .. }) => StatusCode::CONFLICT,
            RegistryError::Routing(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// -----------------------------------------------------------------------------
// Health and observability
// -----------------------------------------------------------------------------

/// Aggregate health handler. The body is the full health report; the status
/// code carries the verdict.
pub async fn health_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    let report = state.health.check().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// Liveness handler (for Kubernetes).
pub async fn live_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness handler: ready once the gateway command channel is up.
pub async fn ready_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    if state.registry.gateway().is_connected().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Control-plane stats response.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub connectors: ConnectorStats,
    pub event_subscribers: usize,
    /// Latest gateway system stats; empty when the gateway is unreachable
    pub gateway: GatewayStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorStats {
    pub total: usize,
    pub connected: usize,
    pub errored: usize,
}

/// Stats handler: local registry totals plus a live gateway stats snapshot.
pub async fn stats_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    let connectors = state.registry.store().all_connectors();
    let connected = connectors.iter().filter(|c| c.status.is_connected()).count();
    let errored = connectors
        .iter()
        .filter(|c| c.status == crate::registry::ConnectorStatus::Error)
        .count();

    let gateway = state
        .registry
        .gateway()
        .system_stats()
        .await
        .unwrap_or_default();

    Json(StatsResponse {
        uptime_seconds: state.uptime().as_secs(),
        connectors: ConnectorStats {
            total: connectors.len(),
            connected,
            errored,
        },
        event_subscribers: state.events.subscriber_count(),
        gateway,
    })
}

/// Metrics handler (Prometheus format).
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let output = String::from_utf8(buffer).unwrap_or_default();
            (
                StatusCode::OK,
                [("content-type", "text/plain; charset=utf-8")],
                output,
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Error encoding metrics: {}", e),
        ),
    }
}

// -----------------------------------------------------------------------------
// Connectors
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateConnectorRequest {
    pub cid: String,
    #[serde(flatten)]
    pub config: ConnectorConfig,
}

pub async fn list_connectors_handler(
    State(state): State<Arc<AdminState>>,
    Path(tenant): Path<String>,
) -> Json<Vec<Connector>> {
    Json(state.registry.list(&tenant))
}

pub async fn create_connector_handler(
    State(state): State<Arc<AdminState>>,
    Path(tenant): Path<String>,
    Json(request): Json<CreateConnectorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let connector = state
        .registry
        .create(&tenant, &request.cid, request.config)
        .await?;
    Ok((StatusCode::CREATED, Json(connector)))
}

pub async fn get_connector_handler(
    State(state): State<Arc<AdminState>>,
    Path((tenant, cid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let live = state.registry.get_live(&tenant, &cid).await?;
    Ok(Json(live))
}

pub async fn update_connector_handler(
    State(state): State<Arc<AdminState>>,
    Path((tenant, cid)): Path<(String, String)>,
    Json(config): Json<ConnectorConfig>,
) -> Result<impl IntoResponse, ApiError> {
    let connector = state.registry.update_config(&tenant, &cid, config)?;
    Ok(Json(connector))
}

pub async fn delete_connector_handler(
    State(state): State<Arc<AdminState>>,
    Path((tenant, cid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.delete(&tenant, &cid).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_connector_handler(
    State(state): State<Arc<AdminState>>,
    Path((tenant, cid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.start(&tenant, &cid).await?;
    // Pull the terminal status in sooner than the regular interval
    state.reconciler.poke();
    Ok(StatusCode::ACCEPTED)
}

pub async fn stop_connector_handler(
    State(state): State<Arc<AdminState>>,
    Path((tenant, cid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.stop(&tenant, &cid).await?;
    state.reconciler.poke();
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

pub async fn connector_logs_handler(
    State(state): State<Arc<AdminState>>,
    Path((tenant, cid)): Path<(String, String)>,
    Query(query): Query<LogsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let logs = state
        .registry
        .logs(&tenant, &cid, query.limit.unwrap_or(100))?;
    Ok(Json(logs))
}

// -----------------------------------------------------------------------------
// Routes
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub order: i32,
    pub route_type: RouteType,
    pub connector_id: String,
    #[serde(default)]
    pub candidates: Vec<String>,
    #[serde(default)]
    pub failover_connector_id: Option<String>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub rate: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl RouteRequest {
    fn into_route(self, tenant: &str) -> Route {
        Route {
            order: self.order,
            tenant: tenant.to_string(),
            route_type: self.route_type,
            connector_id: self.connector_id,
            candidates: self.candidates,
            failover_connector_id: self.failover_connector_id,
            filters: self.filters,
            rate: self.rate,
            is_active: self.is_active,
            messages_routed: 0,
            messages_failed: 0,
        }
    }
}

pub async fn list_routes_handler(
    State(state): State<Arc<AdminState>>,
    Path(tenant): Path<String>,
) -> Json<Vec<Route>> {
    Json(state.registry.list_routes(&tenant))
}

pub async fn create_route_handler(
    State(state): State<Arc<AdminState>>,
    Path(tenant): Path<String>,
    Json(request): Json<RouteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let route = state.registry.create_route(request.into_route(&tenant))?;
    Ok((StatusCode::CREATED, Json(route)))
}

pub async fn update_route_handler(
    State(state): State<Arc<AdminState>>,
    Path((tenant, order)): Path<(String, i32)>,
    Json(mut request): Json<RouteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.order = order;
    let route = state.registry.update_route(request.into_route(&tenant))?;
    Ok(Json(route))
}

pub async fn delete_route_handler(
    State(state): State<Arc<AdminState>>,
    Path((tenant, order)): Path<(String, i32)>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.delete_route(&tenant, order)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Synthetic message for dry-run route evaluation.
#[derive(Debug, Deserialize)]
pub struct RouteTestRequest {
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

pub async fn test_route_handler(
    State(state): State<Arc<AdminState>>,
    Path(tenant): Path<String>,
    Json(request): Json<RouteTestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = MessageContext::from(request.attributes);
    let matched = state.registry.resolve(&tenant, &message)?;
    Ok(Json(matched))
}

// -----------------------------------------------------------------------------
// Filters
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub fid: String,
    pub filter_type: FilterType,
    /// Attribute to inspect; defaults to the type's attribute
    #[serde(default)]
    pub parameter: Option<String>,
    pub value: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default = "default_true")]
    pub is_case_sensitive: bool,
    #[serde(default)]
    pub negate: bool,
}

impl FilterRequest {
    fn into_filter(self, tenant: &str) -> Filter {
        let parameter = self
            .parameter
            .unwrap_or_else(|| self.filter_type.attribute().to_string());
        Filter {
            fid: self.fid,
            tenant: tenant.to_string(),
            filter_type: self.filter_type,
            parameter,
            value: self.value,
            is_regex: self.is_regex,
            is_case_sensitive: self.is_case_sensitive,
            negate: self.negate,
            matches_count: 0,
            last_match: None,
        }
    }
}

pub async fn list_filters_handler(
    State(state): State<Arc<AdminState>>,
    Path(tenant): Path<String>,
) -> Json<Vec<Filter>> {
    Json(state.registry.list_filters(&tenant))
}

pub async fn create_filter_handler(
    State(state): State<Arc<AdminState>>,
    Path(tenant): Path<String>,
    Json(request): Json<FilterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = state.registry.create_filter(request.into_filter(&tenant))?;
    Ok((StatusCode::CREATED, Json(filter)))
}

pub async fn update_filter_handler(
    State(state): State<Arc<AdminState>>,
    Path((tenant, fid)): Path<(String, String)>,
    Json(mut request): Json<FilterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.fid = fid;
    let filter = state.registry.update_filter(request.into_filter(&tenant))?;
    Ok(Json(filter))
}

pub async fn delete_filter_handler(
    State(state): State<Arc<AdminState>>,
    Path((tenant, fid)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.delete_filter(&tenant, &fid)?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Gateway passthrough
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub source: String,
    pub destination: String,
    pub content: String,
}

/// Submit a single message over the gateway's HTTP interface.
pub async fn send_message_handler(
    State(state): State<Arc<AdminState>>,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .http_api
        .send_message(&request.source, &request.destination, &request.content)
        .await
        .map_err(RegistryError::Gateway)?;

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(result)))
}

/// The gateway's own routing table, as it reports it.
pub async fn gateway_routes_handler(
    State(state): State<Arc<AdminState>>,
) -> Result<impl IntoResponse, ApiError> {
    let routes = state
        .registry
        .gateway()
        .list_routes()
        .await
        .map_err(RegistryError::Gateway)?;
    Ok(Json(routes))
}
