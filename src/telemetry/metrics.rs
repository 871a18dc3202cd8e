//! Prometheus counters for the control plane.
//!
//! All metrics are registered against the default registry and exposed by
//! the admin server's `/metrics` endpoint. Registration happens lazily on
//! first use; a name collision (double registration) is a programming error
//! and only occurs in tests that re-init, so it falls back to a detached
//! collector instead of panicking.

use std::sync::OnceLock;

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts};

fn int_counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid counter opts");
    let _ = prometheus::default_registry().register(Box::new(counter.clone()));
    counter
}

fn int_counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter = IntCounterVec::new(Opts::new(name, help), labels).expect("valid counter opts");
    let _ = prometheus::default_registry().register(Box::new(counter.clone()));
    counter
}

fn int_gauge(name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).expect("valid gauge opts");
    let _ = prometheus::default_registry().register(Box::new(gauge.clone()));
    gauge
}

/// Gateway commands executed, by outcome (`ok` / `error` / `timeout`).
pub fn gateway_commands_total() -> &'static IntCounterVec {
    static M: OnceLock<IntCounterVec> = OnceLock::new();
    M.get_or_init(|| {
        int_counter_vec(
            "connectord_gateway_commands_total",
            "Gateway admin commands executed",
            &["outcome"],
        )
    })
}

/// Gateway session reconnect attempts.
pub fn gateway_reconnects_total() -> &'static IntCounter {
    static M: OnceLock<IntCounter> = OnceLock::new();
    M.get_or_init(|| {
        int_counter(
            "connectord_gateway_reconnects_total",
            "Gateway session reconnect attempts",
        )
    })
}

/// Whether the gateway session is currently connected (0/1).
pub fn gateway_connected() -> &'static IntGauge {
    static M: OnceLock<IntGauge> = OnceLock::new();
    M.get_or_init(|| {
        int_gauge(
            "connectord_gateway_connected",
            "Gateway admin session connectivity (1 = connected)",
        )
    })
}

/// Completed reconciliation passes, by outcome (`ok` / `error`).
pub fn reconcile_passes_total() -> &'static IntCounterVec {
    static M: OnceLock<IntCounterVec> = OnceLock::new();
    M.get_or_init(|| {
        int_counter_vec(
            "connectord_reconcile_passes_total",
            "Reconciliation passes completed",
            &["outcome"],
        )
    })
}

/// Drift corrections applied by the reconciler.
pub fn drift_detected_total() -> &'static IntCounter {
    static M: OnceLock<IntCounter> = OnceLock::new();
    M.get_or_init(|| {
        int_counter(
            "connectord_drift_detected_total",
            "Local/gateway status drift corrections",
        )
    })
}

/// Routing decisions, by outcome (`matched` / `no_match`).
pub fn route_decisions_total() -> &'static IntCounterVec {
    static M: OnceLock<IntCounterVec> = OnceLock::new();
    M.get_or_init(|| {
        int_counter_vec(
            "connectord_route_decisions_total",
            "Route table evaluations",
            &["outcome"],
        )
    })
}

/// Touch every metric so all of them appear in the first scrape. Labeled
/// families need at least one child to be emitted at all, so the known
/// label values are seeded at zero.
pub fn register() {
    for outcome in ["ok", "error", "timeout"] {
        gateway_commands_total().with_label_values(&[outcome]);
    }
    gateway_reconnects_total();
    gateway_connected();
    for outcome in ["ok", "error"] {
        reconcile_passes_total().with_label_values(&[outcome]);
    }
    drift_detected_total();
    for outcome in ["matched", "no_match"] {
        route_decisions_total().with_label_values(&[outcome]);
    }
}
