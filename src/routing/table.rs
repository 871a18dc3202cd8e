//! Ordered route evaluation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::telemetry::metrics;

use super::filter::CompiledFilter;
use super::message::MessageContext;

/// Route type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    /// Catch-all fallback, conventionally ordered last with no filters
    Default,
    /// Fixed mapping to a single connector
    StaticMt,
    /// Selection rotates over the route's candidate connectors
    RandomRoundRobin,
    /// Single connector with a designated failover connector
    Failover,
}

impl RouteType {
    pub fn name(&self) -> &'static str {
        match self {
            RouteType::Default => "default",
            RouteType::StaticMt => "static_mt",
            RouteType::RandomRoundRobin => "random_round_robin",
            RouteType::Failover => "failover",
        }
    }
}

/// A routing rule as stored in the registry.
///
/// `order` is a strict total order per tenant; lower evaluates first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub order: i32,
    pub tenant: String,
    pub route_type: RouteType,
    /// Primary target connector
    pub connector_id: String,
    /// Additional round-robin candidates (round-robin routes only)
    #[serde(default)]
    pub candidates: Vec<String>,
    /// Failover connector consulted by the delivery consumer on failure
    #[serde(default)]
    pub failover_connector_id: Option<String>,
    /// Filter ids, combined with logical AND
    #[serde(default)]
    pub filters: Vec<String>,
    /// Cost weight per message
    #[serde(default)]
    pub rate: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Caller-reported outcome counters
    #[serde(default)]
    pub messages_routed: u64,
    #[serde(default)]
    pub messages_failed: u64,
}

fn default_active() -> bool {
    true
}

/// Routing errors
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// No active route (including no default) matched the message
    #[error("no route matched the message")]
    NoRouteMatched,

    /// The matched route targets a connector the registry no longer knows
    #[error("route {order} targets unknown connector {cid}")]
    DanglingConnector { order: i32, cid: String },

    /// A route references a filter id that does not exist
    #[error("route {order} references unknown filter {fid}")]
    UnknownFilter { order: i32, fid: String },

    /// A route definition is internally inconsistent
    #[error("route {order} is invalid: {reason}")]
    InvalidRoute { order: i32, reason: String },
}

/// Result of a successful route evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteMatch {
    pub order: i32,
    pub route_type: RouteType,
    /// Selected connector
    pub connector_id: String,
    /// Failover connector for the delivery consumer, if the route has one
    pub failover_connector_id: Option<String>,
    pub rate: f64,
    /// Filters that matched (all of the route's filters)
    pub matched_filters: Vec<String>,
}

/// One evaluation-ready route
#[derive(Debug)]
struct CompiledRoute {
    definition: Route,
    filters: Vec<CompiledFilter>,
    /// Rotation state for round-robin selection; in-memory only
    rr_counter: AtomicUsize,
}

impl CompiledRoute {
    fn matches(&self, message: &MessageContext) -> bool {
        self.filters.iter().all(|f| f.matches(message))
    }

    fn select_connector(&self) -> &str {
        match self.definition.route_type {
            RouteType::RandomRoundRobin => {
                let mut pool: Vec<&str> = Vec::with_capacity(1 + self.definition.candidates.len());
                pool.push(&self.definition.connector_id);
                pool.extend(self.definition.candidates.iter().map(String::as_str));
                let n = self.rr_counter.fetch_add(1, Ordering::Relaxed);
                pool[n % pool.len()]
            }
            _ => &self.definition.connector_id,
        }
    }
}

/// Evaluation-ready snapshot of a tenant's active routes.
///
/// Built from stored route and filter definitions; evaluation is pure apart
/// from the round-robin rotation counter and may be called concurrently.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile a route table from stored definitions.
    ///
    /// Routes referencing unknown filters or with inconsistent shapes are
    /// rejected; this runs at write/build time, never during evaluation.
    pub fn new(
        mut routes: Vec<Route>,
        filters: &HashMap<String, CompiledFilter>,
    ) -> Result<Self, RoutingError> {
        routes.sort_by_key(|r| r.order);

        let mut compiled = Vec::with_capacity(routes.len());
        for route in routes {
            if route.connector_id.is_empty() {
                return Err(RoutingError::InvalidRoute {
                    order: route.order,
                    reason: "empty connector id".into(),
                });
            }

            if route.route_type == RouteType::Failover && route.failover_connector_id.is_none() {
                return Err(RoutingError::InvalidRoute {
                    order: route.order,
                    reason: "failover route without failover connector".into(),
                });
            }

            let mut route_filters = Vec::with_capacity(route.filters.len());
            for fid in &route.filters {
                let filter = filters.get(fid).ok_or_else(|| RoutingError::UnknownFilter {
                    order: route.order,
                    fid: fid.clone(),
                })?;
                route_filters.push(filter.clone());
            }

            compiled.push(CompiledRoute {
                definition: route,
                filters: route_filters,
                rr_counter: AtomicUsize::new(0),
            });
        }

        Ok(Self { routes: compiled })
    }

    /// Number of routes in the table
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Evaluate the table against a message.
    ///
    /// Routes are tried in ascending order; the first active route whose
    /// filters all match wins. No match is an explicit error, never a
    /// silent drop.
    pub fn evaluate(&self, message: &MessageContext) -> Result<RouteMatch, RoutingError> {
        for route in &self.routes {
            if !route.definition.is_active {
                continue;
            }

            if !route.matches(message) {
                continue;
            }

            let connector_id = route.select_connector().to_string();

            trace!(
                order = route.definition.order,
                route_type = route.definition.route_type.name(),
                connector = %connector_id,
                "route matched"
            );
            metrics::route_decisions_total()
                .with_label_values(&["matched"])
                .inc();

            return Ok(RouteMatch {
                order: route.definition.order,
                route_type: route.definition.route_type,
                connector_id,
                failover_connector_id: route.definition.failover_connector_id.clone(),
                rate: route.definition.rate,
                matched_filters: route.definition.filters.clone(),
            });
        }

        warn!("no route matched");
        metrics::route_decisions_total()
            .with_label_values(&["no_match"])
            .inc();

        Err(RoutingError::NoRouteMatched)
    }

    /// Evaluate and require the selected connector to exist.
    ///
    /// A matched route whose connector was deleted is a routing failure,
    /// not a crash.
    pub fn evaluate_checked<F>(
        &self,
        message: &MessageContext,
        connector_exists: F,
    ) -> Result<RouteMatch, RoutingError>
    where
        F: Fn(&str) -> bool,
    {
        let matched = self.evaluate(message)?;
        if !connector_exists(&matched.connector_id) {
            return Err(RoutingError::DanglingConnector {
                order: matched.order,
                cid: matched.connector_id,
            });
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::filter::{Filter, FilterType};

    fn compiled_filters(defs: Vec<Filter>) -> HashMap<String, CompiledFilter> {
        defs.into_iter()
            .map(|d| (d.fid.clone(), CompiledFilter::compile(d).unwrap()))
            .collect()
    }

    fn dest_filter(fid: &str, pattern: &str) -> Filter {
        Filter {
            fid: fid.into(),
            tenant: "t1".into(),
            filter_type: FilterType::Destination,
            parameter: "destination".into(),
            value: pattern.into(),
            is_regex: true,
            is_case_sensitive: true,
            negate: false,
            matches_count: 0,
            last_match: None,
        }
    }

    fn route(order: i32, route_type: RouteType, connector: &str, filters: Vec<&str>) -> Route {
        Route {
            order,
            tenant: "t1".into(),
            route_type,
            connector_id: connector.into(),
            candidates: Vec::new(),
            failover_connector_id: None,
            filters: filters.into_iter().map(String::from).collect(),
            rate: 0.0,
            is_active: true,
            messages_routed: 0,
            messages_failed: 0,
        }
    }

    fn msg(destination: &str) -> MessageContext {
        MessageContext::new().with("destination", destination)
    }

    #[test]
    fn test_first_match_wins_by_order() {
        let filters = compiled_filters(vec![dest_filter("f1", "^1")]);
        let table = RouteTable::new(
            vec![
                route(2, RouteType::Default, "connB", vec![]),
                route(1, RouteType::StaticMt, "connA", vec!["f1"]),
            ],
            &filters,
        )
        .unwrap();

        let matched = table.evaluate(&msg("15551234")).unwrap();
        assert_eq!(matched.connector_id, "connA");
        assert_eq!(matched.order, 1);

        let fallback = table.evaluate(&msg("25551234")).unwrap();
        assert_eq!(fallback.connector_id, "connB");
        assert_eq!(fallback.route_type, RouteType::Default);
    }

    #[test]
    fn test_no_match_is_explicit_error() {
        let filters = compiled_filters(vec![dest_filter("f1", "^1")]);
        let table = RouteTable::new(
            vec![route(1, RouteType::StaticMt, "connA", vec!["f1"])],
            &filters,
        )
        .unwrap();

        let err = table.evaluate(&msg("99990000")).unwrap_err();
        assert!(matches!(err, RoutingError::NoRouteMatched));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let filters = compiled_filters(vec![dest_filter("f1", "^1")]);
        let table = RouteTable::new(
            vec![
                route(1, RouteType::StaticMt, "connA", vec!["f1"]),
                route(2, RouteType::Default, "connB", vec![]),
            ],
            &filters,
        )
        .unwrap();

        for _ in 0..10 {
            assert_eq!(table.evaluate(&msg("15551234")).unwrap().connector_id, "connA");
            assert_eq!(table.evaluate(&msg("25551234")).unwrap().connector_id, "connB");
        }
    }

    #[test]
    fn test_inactive_routes_skipped() {
        let filters = HashMap::new();
        let mut inactive = route(1, RouteType::StaticMt, "connA", vec![]);
        inactive.is_active = false;
        let table = RouteTable::new(
            vec![inactive, route(2, RouteType::Default, "connB", vec![])],
            &filters,
        )
        .unwrap();

        assert_eq!(table.evaluate(&msg("15551234")).unwrap().connector_id, "connB");
    }

    #[test]
    fn test_all_filters_must_match() {
        let filters = compiled_filters(vec![dest_filter("f1", "^1"), dest_filter("f2", "234$")]);
        let table = RouteTable::new(
            vec![route(1, RouteType::StaticMt, "connA", vec!["f1", "f2"])],
            &filters,
        )
        .unwrap();

        assert!(table.evaluate(&msg("15551234")).is_ok());
        assert!(table.evaluate(&msg("15551299")).is_err());
        assert!(table.evaluate(&msg("25551234")).is_err());
    }

    #[test]
    fn test_round_robin_confined_to_candidates() {
        let filters = HashMap::new();
        let mut rr = route(1, RouteType::RandomRoundRobin, "connA", vec![]);
        rr.candidates = vec!["connB".into(), "connC".into()];
        let table = RouteTable::new(vec![rr], &filters).unwrap();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..9 {
            seen.insert(table.evaluate(&msg("x")).unwrap().connector_id);
        }
        assert_eq!(
            seen,
            ["connA", "connB", "connC"]
                .into_iter()
                .map(String::from)
                .collect()
        );
    }

    #[test]
    fn test_failover_id_exposed() {
        let filters = HashMap::new();
        let mut failover = route(1, RouteType::Failover, "connA", vec![]);
        failover.failover_connector_id = Some("connBackup".into());
        let table = RouteTable::new(vec![failover], &filters).unwrap();

        let matched = table.evaluate(&msg("x")).unwrap();
        assert_eq!(matched.connector_id, "connA");
        assert_eq!(matched.failover_connector_id.as_deref(), Some("connBackup"));
    }

    #[test]
    fn test_failover_route_requires_failover_connector() {
        let filters = HashMap::new();
        let err = RouteTable::new(
            vec![route(1, RouteType::Failover, "connA", vec![])],
            &filters,
        )
        .unwrap_err();
        assert!(matches!(err, RoutingError::InvalidRoute { .. }));
    }

    #[test]
    fn test_unknown_filter_rejected_at_build() {
        let filters = HashMap::new();
        let err = RouteTable::new(
            vec![route(1, RouteType::StaticMt, "connA", vec!["ghost"])],
            &filters,
        )
        .unwrap_err();
        assert!(matches!(err, RoutingError::UnknownFilter { fid, .. } if fid == "ghost"));
    }

    #[test]
    fn test_dangling_connector_is_routing_failure() {
        let filters = HashMap::new();
        let table = RouteTable::new(
            vec![route(1, RouteType::Default, "ghost", vec![])],
            &filters,
        )
        .unwrap();

        let err = table
            .evaluate_checked(&msg("15551234"), |cid| cid != "ghost")
            .unwrap_err();
        assert!(matches!(err, RoutingError::DanglingConnector { cid, .. } if cid == "ghost"));
    }
}
