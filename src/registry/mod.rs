//! Connector registry.
//!
//! Owns the desired-state record for each connector and orchestrates
//! create/start/stop/delete against the gateway command client. Mutating
//! operations either fully succeed (local and remote consistent) or fully
//! fail with any partial local state rolled back; read paths degrade to
//! cached state when the gateway is unreachable.

mod cache;
mod store;
pub(crate) mod types;

pub use cache::TtlCache;
pub use store::{ConnectorStore, MemoryStore, SharedStore};
pub use types::{
    BindType, Connector, ConnectorConfig, ConnectorCounters, ConnectorLog, ConnectorStatus,
    LogLevel,
};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::CacheConfig;
use crate::events::{Event, EventBus};
use crate::gateway::parse::ConnectorListing;
use crate::gateway::{GatewayClient, GatewayError};
use crate::routing::{
    CompiledFilter, Filter, FilterConfigError, MessageContext, Route, RouteMatch, RouteTable,
    RouteType, RoutingError,
};

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("connector {cid} already exists")]
    DuplicateConnector { cid: String },

    #[error("connector {cid} not found")]
    ConnectorNotFound { cid: String },

    #[error("connector {cid} cannot {action} while {status}")]
    InvalidTransition {
        cid: String,
        action: &'static str,
        status: ConnectorStatus,
    },

    #[error("route {order} already exists")]
    DuplicateRoute { order: i32 },

    #[error("route {order} not found")]
    RouteNotFound { order: i32 },

    #[error("filter {fid} already exists")]
    DuplicateFilter { fid: String },

    #[error("filter {fid} not found")]
    FilterNotFound { fid: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    FilterConfig(#[from] FilterConfigError),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// A connector read together with its freshness
#[derive(Debug, Clone, serde::Serialize)]
pub struct LiveConnector {
    pub connector: Connector,
    /// True when the gateway was unreachable and the status is the
    /// last-known cached value
    pub stale: bool,
}

/// The registry. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct ConnectorRegistry {
    store: SharedStore,
    gateway: GatewayClient,
    events: Arc<EventBus>,
    listing_cache: Arc<TtlCache<Vec<ConnectorListing>>>,
}

impl ConnectorRegistry {
    pub fn new(
        store: SharedStore,
        gateway: GatewayClient,
        events: Arc<EventBus>,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            listing_cache: Arc::new(TtlCache::new(cache_config.ttl)),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    // -------------------------------------------------------------------------
    // Connector lifecycle
    // -------------------------------------------------------------------------

    /// Create a connector: local record first, then remote creation, with
    /// local rollback if the remote call fails. The registry never keeps a
    /// connector the gateway does not know about.
    pub async fn create(
        &self,
        tenant: &str,
        cid: &str,
        config: ConnectorConfig,
    ) -> Result<Connector, RegistryError> {
        // Uniqueness is enforced before any remote call
        if !self
            .store
            .insert_connector(Connector::new(cid, tenant, config.clone()))
        {
            return Err(RegistryError::DuplicateConnector {
                cid: cid.to_string(),
            });
        }

        if let Err(err) = self.gateway.create_connector(cid, &config).await {
            // Roll the local record back so no orphan survives the failure
            self.store.delete_connector(cid);
            warn!(cid, error = %err, "remote connector creation failed, local record rolled back");
            return Err(err.into());
        }

        self.store.append_log(ConnectorLog::new(
            cid,
            LogLevel::Info,
            "created",
            "connector created",
        ));
        self.listing_cache.invalidate();
        self.events.publish(Event::ConnectorCreated {
            cid: cid.to_string(),
        });
        info!(cid, tenant, "connector created");

        self.store
            .get_connector(cid)
            .ok_or_else(|| RegistryError::ConnectorNotFound {
                cid: cid.to_string(),
            })
    }

    /// Get a tenant's connector from the local store.
    pub fn get(&self, tenant: &str, cid: &str) -> Result<Connector, RegistryError> {
        self.store
            .get_connector(cid)
            .filter(|c| c.tenant == tenant)
            .ok_or_else(|| RegistryError::ConnectorNotFound {
                cid: cid.to_string(),
            })
    }

    /// List a tenant's connectors from the local store.
    pub fn list(&self, tenant: &str) -> Vec<Connector> {
        self.store.list_connectors(tenant)
    }

    /// Update a connector's desired configuration.
    pub fn update_config(
        &self,
        tenant: &str,
        cid: &str,
        config: ConnectorConfig,
    ) -> Result<Connector, RegistryError> {
        self.get(tenant, cid)?;
        self.store
            .update_connector(cid, Box::new(move |c| c.config = config));
        self.listing_cache.invalidate();
        self.events.publish(Event::ConnectorUpdated {
            cid: cid.to_string(),
        });
        self.get(tenant, cid)
    }

    /// Live read: refresh the status from the gateway, falling back to the
    /// cached record with a staleness flag when the gateway is unreachable.
    pub async fn get_live(&self, tenant: &str, cid: &str) -> Result<LiveConnector, RegistryError> {
        let connector = self.get(tenant, cid)?;

        match self.gateway.connector_status(cid).await {
            Ok(block) => {
                if let Some(observed) = block
                    .field("status")
                    .and_then(ConnectorStatus::parse_observed)
                {
                    self.apply_observed(cid, observed);
                }
                Ok(LiveConnector {
                    connector: self.get(tenant, cid)?,
                    stale: false,
                })
            }
            Err(err) => {
                warn!(cid, error = %err, "live status refresh failed, serving cached status");
                Ok(LiveConnector {
                    connector,
                    stale: true,
                })
            }
        }
    }

    /// Request a start. Sets only the transitional `Starting` status; the
    /// reconciler promotes it once the gateway reports the terminal state.
    pub async fn start(&self, tenant: &str, cid: &str) -> Result<(), RegistryError> {
        let connector = self.get(tenant, cid)?;
        if !connector.status.can_start() {
            return Err(RegistryError::InvalidTransition {
                cid: cid.to_string(),
                action: "start",
                status: connector.status,
            });
        }

        // On failure nothing is mutated
        self.gateway.start_connector(cid).await?;

        self.store.update_connector(
            cid,
            Box::new(|c| c.status = ConnectorStatus::Starting),
        );
        self.store.append_log(ConnectorLog::new(
            cid,
            LogLevel::Info,
            "start_requested",
            "start command accepted by gateway",
        ));
        self.listing_cache.invalidate();
        self.events.publish(Event::ConnectorStarting {
            cid: cid.to_string(),
        });
        Ok(())
    }

    /// Request a stop. Mirror of [`ConnectorRegistry::start`].
    pub async fn stop(&self, tenant: &str, cid: &str) -> Result<(), RegistryError> {
        let connector = self.get(tenant, cid)?;
        if !connector.status.can_stop() {
            return Err(RegistryError::InvalidTransition {
                cid: cid.to_string(),
                action: "stop",
                status: connector.status,
            });
        }

        self.gateway.stop_connector(cid).await?;

        self.store.update_connector(
            cid,
            Box::new(|c| c.status = ConnectorStatus::Stopping),
        );
        self.store.append_log(ConnectorLog::new(
            cid,
            LogLevel::Info,
            "stop_requested",
            "stop command accepted by gateway",
        ));
        self.listing_cache.invalidate();
        self.events.publish(Event::ConnectorStopping {
            cid: cid.to_string(),
        });
        Ok(())
    }

    /// Delete a connector. Remote stop and removal are best-effort; the
    /// local record is removed unconditionally. Routes referencing the
    /// connector are left dangling and surface as routing failures.
    pub async fn delete(&self, tenant: &str, cid: &str) -> Result<(), RegistryError> {
        let connector = self.get(tenant, cid)?;

        if connector.status.is_connected() || connector.status.is_transitional() {
            if let Err(err) = self.gateway.stop_connector(cid).await {
                warn!(cid, error = %err, "graceful stop before delete failed");
            }
        }
        if let Err(err) = self.gateway.remove_connector(cid).await {
            warn!(cid, error = %err, "remote connector removal failed");
        }

        self.store.delete_connector(cid);
        self.store.append_log(ConnectorLog::new(
            cid,
            LogLevel::Info,
            "deleted",
            "connector deleted",
        ));
        self.listing_cache.invalidate();
        self.events.publish(Event::ConnectorDeleted {
            cid: cid.to_string(),
        });
        info!(cid, tenant, "connector deleted");
        Ok(())
    }

    /// Connector logs, newest first.
    pub fn logs(&self, tenant: &str, cid: &str, limit: usize) -> Result<Vec<ConnectorLog>, RegistryError> {
        self.get(tenant, cid)?;
        Ok(self.store.get_logs(cid, limit))
    }

    // -------------------------------------------------------------------------
    // Observed-state application (reconciler + live reads only)
    // -------------------------------------------------------------------------

    /// Apply a gateway-observed status. This is the only write path for
    /// terminal status values; returns the transition when the status
    /// actually changed.
    pub fn apply_observed(
        &self,
        cid: &str,
        observed: ConnectorStatus,
    ) -> Option<(ConnectorStatus, ConnectorStatus)> {
        debug_assert!(observed.is_observed());

        let previous = self.store.get_connector(cid)?.status;
        if previous == observed {
            return None;
        }

        self.store.update_connector(
            cid,
            Box::new(move |c| {
                c.status = observed;
                match observed {
                    ConnectorStatus::Started | ConnectorStatus::Bound => {
                        c.last_connected = Some(Utc::now());
                        c.counters.connection_count += 1;
                    }
                    ConnectorStatus::Error => {
                        c.counters.error_count += 1;
                        c.last_error = Some("gateway reported error".to_string());
                    }
                    _ => {}
                }
            }),
        );

        self.events.publish(Event::StatusChanged {
            cid: cid.to_string(),
            previous,
            current: observed,
        });
        Some((previous, observed))
    }

    /// Gateway connector listing with TTL caching.
    pub async fn gateway_listing(&self) -> Result<Vec<ConnectorListing>, RegistryError> {
        if let Some(cached) = self.listing_cache.get() {
            return Ok(cached);
        }
        let listing = self.gateway.list_connectors().await?;
        self.listing_cache.put(listing.clone());
        Ok(listing)
    }

    // -------------------------------------------------------------------------
    // Routes
    // -------------------------------------------------------------------------

    /// Validate a route definition before it is persisted. Filter references
    /// must resolve within the route's tenant and failover routes must carry
    /// a failover connector; applies to both create and update so an invalid
    /// shape can never reach `route_table`.
    fn validate_route(&self, route: &Route) -> Result<(), RegistryError> {
        for fid in &route.filters {
            let known = self
                .store
                .get_filter(fid)
                .is_some_and(|f| f.tenant == route.tenant);
            if !known {
                return Err(RegistryError::FilterNotFound { fid: fid.clone() });
            }
        }
        if route.route_type == RouteType::Failover && route.failover_connector_id.is_none() {
            return Err(RoutingError::InvalidRoute {
                order: route.order,
                reason: "failover route without failover connector".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Create a route. Filter references and the route shape are validated
    /// up front; the order slot must be free.
    pub fn create_route(&self, route: Route) -> Result<Route, RegistryError> {
        self.validate_route(&route)?;

        let tenant = route.tenant.clone();
        let order = route.order;
        if !self.store.insert_route(route) {
            return Err(RegistryError::DuplicateRoute { order });
        }
        self.store
            .get_route(&tenant, order)
            .ok_or(RegistryError::RouteNotFound { order })
    }

    pub fn list_routes(&self, tenant: &str) -> Vec<Route> {
        self.store.list_routes(tenant)
    }

    /// Replace a route definition in place (order and tenant fixed).
    pub fn update_route(&self, mut route: Route) -> Result<Route, RegistryError> {
        self.validate_route(&route)?;

        let tenant = route.tenant.clone();
        let order = route.order;
        let existing =
            self.store
                .get_route(&tenant, order)
                .ok_or(RegistryError::RouteNotFound { order })?;
        // Outcome counters survive the update
        route.messages_routed = existing.messages_routed;
        route.messages_failed = existing.messages_failed;

        self.store
            .update_route(&tenant, order, Box::new(move |r| *r = route));
        self.store
            .get_route(&tenant, order)
            .ok_or(RegistryError::RouteNotFound { order })
    }

    pub fn delete_route(&self, tenant: &str, order: i32) -> Result<(), RegistryError> {
        if !self.store.delete_route(tenant, order) {
            return Err(RegistryError::RouteNotFound { order });
        }
        Ok(())
    }

    /// Record a delivery outcome reported by the message consumer.
    pub fn report_route_outcome(
        &self,
        tenant: &str,
        order: i32,
        success: bool,
    ) -> Result<(), RegistryError> {
        let updated = self.store.update_route(
            tenant,
            order,
            Box::new(move |r| {
                if success {
                    r.messages_routed += 1;
                } else {
                    r.messages_failed += 1;
                }
            }),
        );
        if !updated {
            return Err(RegistryError::RouteNotFound { order });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------

    /// Create a filter. The definition is compiled for validation before it
    /// is persisted; malformed regexes never reach evaluation time.
    pub fn create_filter(&self, filter: Filter) -> Result<Filter, RegistryError> {
        CompiledFilter::compile(filter.clone())?;

        let fid = filter.fid.clone();
        if !self.store.insert_filter(filter) {
            return Err(RegistryError::DuplicateFilter { fid });
        }
        self.store
            .get_filter(&fid)
            .ok_or(RegistryError::FilterNotFound { fid })
    }

    pub fn list_filters(&self, tenant: &str) -> Vec<Filter> {
        self.store.list_filters(tenant)
    }

    /// A filter belongs to exactly one tenant; mutations by any other tenant
    /// see it as absent.
    fn owned_filter(&self, tenant: &str, fid: &str) -> Result<Filter, RegistryError> {
        self.store
            .get_filter(fid)
            .filter(|f| f.tenant == tenant)
            .ok_or_else(|| RegistryError::FilterNotFound {
                fid: fid.to_string(),
            })
    }

    /// Replace a filter definition, revalidating it.
    pub fn update_filter(&self, mut filter: Filter) -> Result<Filter, RegistryError> {
        CompiledFilter::compile(filter.clone())?;

        let fid = filter.fid.clone();
        let existing = self.owned_filter(&filter.tenant, &fid)?;
        filter.matches_count = existing.matches_count;
        filter.last_match = existing.last_match;

        self.store
            .update_filter(&fid, Box::new(move |f| *f = filter));
        self.store
            .get_filter(&fid)
            .ok_or(RegistryError::FilterNotFound { fid })
    }

    pub fn delete_filter(&self, tenant: &str, fid: &str) -> Result<(), RegistryError> {
        self.owned_filter(tenant, fid)?;
        if !self.store.delete_filter(fid) {
            return Err(RegistryError::FilterNotFound {
                fid: fid.to_string(),
            });
        }
        Ok(())
    }

    /// Record a filter match reported by the message consumer.
    pub fn report_filter_match(&self, tenant: &str, fid: &str) -> Result<(), RegistryError> {
        self.owned_filter(tenant, fid)?;
        let updated = self.store.update_filter(
            fid,
            Box::new(|f| {
                f.matches_count += 1;
                f.last_match = Some(Utc::now());
            }),
        );
        if !updated {
            return Err(RegistryError::FilterNotFound {
                fid: fid.to_string(),
            });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Route resolution
    // -------------------------------------------------------------------------

    /// Build the evaluation-ready route table for a tenant.
    pub fn route_table(&self, tenant: &str) -> Result<RouteTable, RegistryError> {
        let mut filters = HashMap::new();
        for definition in self.store.list_filters(tenant) {
            let fid = definition.fid.clone();
            filters.insert(fid, CompiledFilter::compile(definition)?);
        }
        Ok(RouteTable::new(self.store.list_routes(tenant), &filters)?)
    }

    /// Resolve one message to a connector. A matched route whose connector
    /// was deleted is a routing failure, not a crash.
    pub fn resolve(
        &self,
        tenant: &str,
        message: &MessageContext,
    ) -> Result<RouteMatch, RegistryError> {
        let table = self.route_table(tenant)?;
        let matched = table.evaluate_checked(message, |cid| {
            self.store
                .get_connector(cid)
                .is_some_and(|c| c.tenant == tenant)
        })?;
        Ok(matched)
    }
}
