//! Admin API integration tests.
//!
//! Each test starts the full admin router over a registry backed by the
//! scripted gateway, then drives it over HTTP like an operator would.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use connectord::admin::{build_router, AdminState};
use connectord::config::{CacheConfig, GatewayConfig, ReconcilerConfig};
use connectord::events::EventBus;
use connectord::gateway::health::HealthChecker;
use connectord::gateway::http::HttpApi;
use connectord::gateway::mock::MockGateway;
use connectord::gateway::GatewayClient;
use connectord::registry::{ConnectorRegistry, MemoryStore};
use connectord::sync::Reconciler;

/// Test fixture running the admin router on an OS-assigned port.
struct TestServer {
    mock: Arc<MockGateway>,
    cancel: CancellationToken,
    base_url: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let mock = MockGateway::new();
        let events = EventBus::new(64);
        let gateway = GatewayClient::new(mock.clone());
        let registry = ConnectorRegistry::new(
            MemoryStore::new(),
            gateway.clone(),
            events.clone(),
            &CacheConfig::default(),
        );

        // The gateway's HTTP side points at a closed port; probe-dependent
        // endpoints degrade rather than fail
        let gateway_config = GatewayConfig {
            host: "127.0.0.1".into(),
            telnet_port: 1,
            http_port: 1,
            username: "admin".into(),
            password: "secret".into(),
            connect_timeout: Duration::from_millis(200),
            response_timeout: Duration::from_millis(200),
            http_timeout: Duration::from_millis(200),
        };
        let http_api = HttpApi::new(&gateway_config);
        let health = HealthChecker::new(gateway, http_api.clone());

        let cancel = CancellationToken::new();
        let reconciler = Reconciler::new(registry.clone(), events.clone(), &ReconcilerConfig::default())
            .spawn(cancel.clone());

        let state = AdminState::new(registry, health, http_api, events, reconciler);
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address: SocketAddr = listener.local_addr().unwrap();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
        });

        Self {
            mock,
            cancel,
            base_url: format!("http://{address}"),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client.delete(self.url(path)).send().await.unwrap()
    }

    fn connector_body(cid: &str) -> Value {
        json!({
            "cid": cid,
            "host": "smsc.example.net",
            "port": 2775,
            "username": "smppclient",
            "password": "password",
        })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tokio::test]
async fn test_livez_and_readyz() {
    let server = TestServer::start().await;

    assert_eq!(server.get("/livez").await.status(), StatusCode::OK);
    assert_eq!(server.get("/readyz").await.status(), StatusCode::OK);

    server.mock.set_connected(false);
    assert_eq!(
        server.get("/readyz").await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_healthz_reports_degraded_http_side() {
    let server = TestServer::start().await;

    // Command channel is up but the gateway HTTP port is closed, so the
    // aggregate verdict is unhealthy with the detail visible in the body
    let resp = server.get("/healthz").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["healthy"], json!(false));
    assert_eq!(body["telnet"], json!("connected"));
    assert_eq!(body["http_api"]["state"], json!("unavailable"));
}

#[tokio::test]
async fn test_connector_lifecycle_over_http() {
    let server = TestServer::start().await;

    let resp = server
        .post("/tenants/t1/connectors", TestServer::connector_body("conn1"))
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["status"], json!("stopped"));

    // Duplicate cid is a conflict
    let resp = server
        .post("/tenants/t1/connectors", TestServer::connector_body("conn1"))
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // Gateway-side record appears; start the connector
    server.mock.set_status("conn1", "started");
    let resp = server.post("/tenants/t1/connectors/conn1/start", json!({})).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    // A live read folds the gateway-reported status in
    let resp = server.get("/tenants/t1/connectors/conn1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let live: Value = resp.json().await.unwrap();
    assert_eq!(live["stale"], json!(false));
    assert_eq!(live["connector"]["status"], json!("started"));

    // Operational log recorded the lifecycle
    let resp = server.get("/tenants/t1/connectors/conn1/logs").await;
    let logs: Value = resp.json().await.unwrap();
    assert!(logs.as_array().unwrap().len() >= 2);

    let resp = server.delete("/tenants/t1/connectors/conn1").await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        server.get("/tenants/t1/connectors/conn1").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_start_from_wrong_state_is_conflict() {
    let server = TestServer::start().await;
    server
        .post("/tenants/t1/connectors", TestServer::connector_body("conn1"))
        .await;
    server.mock.set_status("conn1", "started");

    server.post("/tenants/t1/connectors/conn1/start", json!({})).await;
    // Second start while starting (or already started, if the poked
    // reconciliation pass got there first)
    let resp = server.post("/tenants/t1/connectors/conn1/start", json!({})).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_tenant_isolation() {
    let server = TestServer::start().await;
    server
        .post("/tenants/t1/connectors", TestServer::connector_body("conn1"))
        .await;

    // Another tenant cannot see or touch it
    let list: Value = server.get("/tenants/t2/connectors").await.json().await.unwrap();
    assert!(list.as_array().unwrap().is_empty());
    assert_eq!(
        server.get("/tenants/t2/connectors/conn1").await.status(),
        StatusCode::NOT_FOUND
    );

    // Filters are tenant-owned the same way
    server
        .post(
            "/tenants/t1/filters",
            json!({
                "fid": "f1",
                "filter_type": "destination",
                "value": "^1",
                "is_regex": true,
            }),
        )
        .await;
    let resp = server
        .client
        .put(server.url("/tenants/t2/filters/f1"))
        .json(&json!({
            "fid": "f1",
            "filter_type": "destination",
            "value": "^9",
            "is_regex": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        server.delete("/tenants/t2/filters/f1").await.status(),
        StatusCode::NOT_FOUND
    );

    let filters: Value = server.get("/tenants/t1/filters").await.json().await.unwrap();
    assert_eq!(filters.as_array().unwrap().len(), 1);
    assert_eq!(filters[0]["value"], json!("^1"));
}

#[tokio::test]
async fn test_routing_rules_and_dry_run() {
    let server = TestServer::start().await;
    server
        .post("/tenants/t1/connectors", TestServer::connector_body("connA"))
        .await;
    server
        .post("/tenants/t1/connectors", TestServer::connector_body("connB"))
        .await;

    let resp = server
        .post(
            "/tenants/t1/filters",
            json!({
                "fid": "us_numbers",
                "filter_type": "destination",
                "value": "^1",
                "is_regex": true,
            }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = server
        .post(
            "/tenants/t1/routes",
            json!({
                "order": 1,
                "route_type": "static_mt",
                "connector_id": "connA",
                "filters": ["us_numbers"],
            }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = server
        .post(
            "/tenants/t1/routes",
            json!({
                "order": 99,
                "route_type": "default",
                "connector_id": "connB",
            }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // US number hits the filtered route
    let matched: Value = server
        .post(
            "/tenants/t1/routes/test",
            json!({"attributes": {"destination": "15551234567"}}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(matched["order"], json!(1));
    assert_eq!(matched["connector_id"], json!("connA"));
    assert_eq!(matched["matched_filters"], json!(["us_numbers"]));

    // Everything else falls through to the default
    let matched: Value = server
        .post(
            "/tenants/t1/routes/test",
            json!({"attributes": {"destination": "25551234567"}}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(matched["connector_id"], json!("connB"));

    // Deleting the default's connector turns that match into a conflict
    server.delete("/tenants/t1/connectors/connB").await;
    let resp = server
        .post(
            "/tenants/t1/routes/test",
            json!({"attributes": {"destination": "25551234567"}}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_route_without_matching_rule_is_not_found() {
    let server = TestServer::start().await;
    let resp = server
        .post("/tenants/t1/routes/test", json!({"attributes": {"destination": "123"}}))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_filter_rejected() {
    let server = TestServer::start().await;
    let resp = server
        .post(
            "/tenants/t1/filters",
            json!({
                "fid": "broken",
                "filter_type": "content",
                "value": "[unclosed",
                "is_regex": true,
            }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let list: Value = server.get("/tenants/t1/filters").await.json().await.unwrap();
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_route_referencing_missing_filter_rejected() {
    let server = TestServer::start().await;
    let resp = server
        .post(
            "/tenants/t1/routes",
            json!({
                "order": 1,
                "route_type": "static_mt",
                "connector_id": "connA",
                "filters": ["ghost"],
            }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gateway_failure_surfaces_as_bad_gateway() {
    let server = TestServer::start().await;
    server.mock.set_connected(false);

    let resp = server
        .post("/tenants/t1/connectors", TestServer::connector_body("conn1"))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    // The failed creation left nothing behind
    server.mock.set_connected(true);
    let list: Value = server.get("/tenants/t1/connectors").await.json().await.unwrap();
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_and_metrics_endpoints() {
    let server = TestServer::start().await;
    server
        .post("/tenants/t1/connectors", TestServer::connector_body("conn1"))
        .await;

    let resp = server.get("/stats").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let stats: Value = resp.json().await.unwrap();
    assert_eq!(stats["connectors"]["total"], json!(1));
    // Built-in gateway stats snapshot came through
    assert_eq!(stats["gateway"]["total_messages_sent"], json!(0));

    let resp = server.get("/metrics").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("connectord_gateway_commands_total"));
}
