//! Desired-state storage.
//!
//! All local records (connectors, routes, filters, logs) live behind the
//! [`ConnectorStore`] trait. The in-memory implementation is the provided
//! backend; a durable one can slot in behind the same trait.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::routing::{Filter, Route};

use super::types::{Connector, ConnectorLog};

/// Maximum retained log entries before the oldest are pruned.
const MAX_LOG_ENTRIES: usize = 10_000;

/// Unified storage trait for desired-state records.
///
/// All implementations must be thread-safe (Send + Sync). Mutations take
/// closures so read-modify-write stays atomic per record.
pub trait ConnectorStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Connector Operations
    // -------------------------------------------------------------------------

    /// Insert a new connector. Returns false when the cid is already taken.
    fn insert_connector(&self, connector: Connector) -> bool;

    /// Get a connector by cid.
    fn get_connector(&self, cid: &str) -> Option<Connector>;

    /// Whether a connector exists.
    fn connector_exists(&self, cid: &str) -> bool;

    /// List a tenant's connectors, ordered by cid.
    fn list_connectors(&self, tenant: &str) -> Vec<Connector>;

    /// List every connector across tenants, ordered by cid. Used by the
    /// reconciler, which compares the whole local set against the gateway.
    fn all_connectors(&self) -> Vec<Connector>;

    /// Update a connector in place. Returns false when absent.
    fn update_connector(&self, cid: &str, f: Box<dyn FnOnce(&mut Connector) + Send>) -> bool;

    /// Delete a connector. Returns false when absent.
    fn delete_connector(&self, cid: &str) -> bool;

    // -------------------------------------------------------------------------
    // Route Operations
    // -------------------------------------------------------------------------

    /// Insert a route. Returns false when the (tenant, order) slot is taken.
    fn insert_route(&self, route: Route) -> bool;

    /// Get a route by tenant and order.
    fn get_route(&self, tenant: &str, order: i32) -> Option<Route>;

    /// List a tenant's routes in ascending order.
    fn list_routes(&self, tenant: &str) -> Vec<Route>;

    /// Update a route in place. Returns false when absent.
    fn update_route(&self, tenant: &str, order: i32, f: Box<dyn FnOnce(&mut Route) + Send>)
        -> bool;

    /// Delete a route. Returns false when absent.
    fn delete_route(&self, tenant: &str, order: i32) -> bool;

    // -------------------------------------------------------------------------
    // Filter Operations
    // -------------------------------------------------------------------------

    /// Insert a filter. Returns false when the fid is already taken.
    fn insert_filter(&self, filter: Filter) -> bool;

    /// Get a filter by fid.
    fn get_filter(&self, fid: &str) -> Option<Filter>;

    /// List a tenant's filters, ordered by fid.
    fn list_filters(&self, tenant: &str) -> Vec<Filter>;

    /// Update a filter in place. Returns false when absent.
    fn update_filter(&self, fid: &str, f: Box<dyn FnOnce(&mut Filter) + Send>) -> bool;

    /// Delete a filter. Returns false when absent.
    fn delete_filter(&self, fid: &str) -> bool;

    // -------------------------------------------------------------------------
    // Log Operations
    // -------------------------------------------------------------------------

    /// Append a log entry (write-once, never mutated).
    fn append_log(&self, log: ConnectorLog);

    /// Newest-first log entries for a connector.
    fn get_logs(&self, cid: &str, limit: usize) -> Vec<ConnectorLog>;
}

/// Shared store handle.
pub type SharedStore = Arc<dyn ConnectorStore>;

/// In-memory store. Thread-safe, volatile.
#[derive(Default)]
pub struct MemoryStore {
    connectors: RwLock<HashMap<String, Connector>>,
    routes: RwLock<HashMap<(String, i32), Route>>,
    filters: RwLock<HashMap<String, Filter>>,
    logs: RwLock<Vec<ConnectorLog>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl ConnectorStore for MemoryStore {
    fn insert_connector(&self, connector: Connector) -> bool {
        let mut connectors = self.connectors.write().unwrap();
        if connectors.contains_key(&connector.cid) {
            return false;
        }
        connectors.insert(connector.cid.clone(), connector);
        true
    }

    fn get_connector(&self, cid: &str) -> Option<Connector> {
        self.connectors.read().unwrap().get(cid).cloned()
    }

    fn connector_exists(&self, cid: &str) -> bool {
        self.connectors.read().unwrap().contains_key(cid)
    }

    fn list_connectors(&self, tenant: &str) -> Vec<Connector> {
        let mut connectors: Vec<Connector> = self
            .connectors
            .read()
            .unwrap()
            .values()
            .filter(|c| c.tenant == tenant)
            .cloned()
            .collect();
        connectors.sort_by(|a, b| a.cid.cmp(&b.cid));
        connectors
    }

    fn all_connectors(&self) -> Vec<Connector> {
        let mut connectors: Vec<Connector> =
            self.connectors.read().unwrap().values().cloned().collect();
        connectors.sort_by(|a, b| a.cid.cmp(&b.cid));
        connectors
    }

    fn update_connector(&self, cid: &str, f: Box<dyn FnOnce(&mut Connector) + Send>) -> bool {
        let mut connectors = self.connectors.write().unwrap();
        match connectors.get_mut(cid) {
            Some(connector) => {
                f(connector);
                connector.updated_at = chrono::Utc::now();
                true
            }
            None => false,
        }
    }

    fn delete_connector(&self, cid: &str) -> bool {
        self.connectors.write().unwrap().remove(cid).is_some()
    }

    fn insert_route(&self, route: Route) -> bool {
        let mut routes = self.routes.write().unwrap();
        let key = (route.tenant.clone(), route.order);
        if routes.contains_key(&key) {
            return false;
        }
        routes.insert(key, route);
        true
    }

    fn get_route(&self, tenant: &str, order: i32) -> Option<Route> {
        self.routes
            .read()
            .unwrap()
            .get(&(tenant.to_string(), order))
            .cloned()
    }

    fn list_routes(&self, tenant: &str) -> Vec<Route> {
        let mut routes: Vec<Route> = self
            .routes
            .read()
            .unwrap()
            .values()
            .filter(|r| r.tenant == tenant)
            .cloned()
            .collect();
        routes.sort_by_key(|r| r.order);
        routes
    }

    fn update_route(
        &self,
        tenant: &str,
        order: i32,
        f: Box<dyn FnOnce(&mut Route) + Send>,
    ) -> bool {
        let mut routes = self.routes.write().unwrap();
        match routes.get_mut(&(tenant.to_string(), order)) {
            Some(route) => {
                f(route);
                true
            }
            None => false,
        }
    }

    fn delete_route(&self, tenant: &str, order: i32) -> bool {
        self.routes
            .write()
            .unwrap()
            .remove(&(tenant.to_string(), order))
            .is_some()
    }

    fn insert_filter(&self, filter: Filter) -> bool {
        let mut filters = self.filters.write().unwrap();
        if filters.contains_key(&filter.fid) {
            return false;
        }
        filters.insert(filter.fid.clone(), filter);
        true
    }

    fn get_filter(&self, fid: &str) -> Option<Filter> {
        self.filters.read().unwrap().get(fid).cloned()
    }

    fn list_filters(&self, tenant: &str) -> Vec<Filter> {
        let mut filters: Vec<Filter> = self
            .filters
            .read()
            .unwrap()
            .values()
            .filter(|f| f.tenant == tenant)
            .cloned()
            .collect();
        filters.sort_by(|a, b| a.fid.cmp(&b.fid));
        filters
    }

    fn update_filter(&self, fid: &str, f: Box<dyn FnOnce(&mut Filter) + Send>) -> bool {
        let mut filters = self.filters.write().unwrap();
        match filters.get_mut(fid) {
            Some(filter) => {
                f(filter);
                true
            }
            None => false,
        }
    }

    fn delete_filter(&self, fid: &str) -> bool {
        self.filters.write().unwrap().remove(fid).is_some()
    }

    fn append_log(&self, log: ConnectorLog) {
        let mut logs = self.logs.write().unwrap();
        logs.push(log);
        if logs.len() > MAX_LOG_ENTRIES {
            let excess = logs.len() - MAX_LOG_ENTRIES;
            logs.drain(..excess);
        }
    }

    fn get_logs(&self, cid: &str, limit: usize) -> Vec<ConnectorLog> {
        self.logs
            .read()
            .unwrap()
            .iter()
            .rev()
            .filter(|l| l.cid == cid)
            .take(limit)
            .cloned()
            .collect()
    }
}
