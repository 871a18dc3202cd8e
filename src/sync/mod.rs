//! Gateway reconciliation loop.
//!
//! Periodically polls the gateway's connector listing and folds the observed
//! statuses back into the registry. The gateway is the source of truth for
//! terminal statuses; local records are a cache that this loop keeps honest.
//! Drift (a terminal local status the gateway contradicts) is corrected,
//! logged, and published. A connector the gateway no longer knows about is
//! also drift and is marked errored rather than silently left running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::events::{Event, EventBus};
use crate::gateway::GatewayError;
use crate::registry::{ConnectorLog, ConnectorRegistry, ConnectorStatus, LogLevel};
use crate::telemetry::metrics;

/// Outcome of a single reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Local connectors examined
    pub connectors: usize,
    /// Drift corrections applied
    pub drift: usize,
}

/// Handle for requesting an immediate pass outside the regular interval.
#[derive(Clone)]
pub struct ReconcilerHandle {
    poke_tx: mpsc::Sender<()>,
}

impl ReconcilerHandle {
    /// Request a pass as soon as the loop is idle. Lossy by design; a
    /// pending request is enough, more pokes add nothing.
    pub fn poke(&self) {
        let _ = self.poke_tx.try_send(());
    }
}

/// The reconciliation worker.
pub struct Reconciler {
    registry: ConnectorRegistry,
    events: Arc<EventBus>,
    interval: Duration,
    max_backoff_multiplier: u32,
}

impl Reconciler {
    pub fn new(
        registry: ConnectorRegistry,
        events: Arc<EventBus>,
        config: &ReconcilerConfig,
    ) -> Self {
        Self {
            registry,
            events,
            interval: config.interval,
            max_backoff_multiplier: config.max_backoff_multiplier,
        }
    }

    /// Spawn the loop. It runs until `cancel` fires; the returned handle
    /// can request out-of-band passes.
    pub fn spawn(self, cancel: CancellationToken) -> ReconcilerHandle {
        let (poke_tx, poke_rx) = mpsc::channel(1);
        tokio::spawn(self.run(cancel, poke_rx));
        ReconcilerHandle { poke_tx }
    }

    async fn run(self, cancel: CancellationToken, mut poke_rx: mpsc::Receiver<()>) {
        info!(interval = ?self.interval, "reconciler started");
        let mut consecutive_failures: u32 = 0;

        loop {
            let delay = self.next_delay(consecutive_failures);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("reconciler stopping");
                    return;
                }
                _ = sleep(delay) => {}
                Some(()) = poke_rx.recv() => {
                    debug!("reconciliation pass requested");
                }
            }

            match self.run_once().await {
                Ok(summary) => {
                    consecutive_failures = 0;
                    metrics::reconcile_passes_total()
                        .with_label_values(&["ok"])
                        .inc();
                    debug!(
                        connectors = summary.connectors,
                        drift = summary.drift,
                        "reconciliation pass complete"
                    );
                }
                Err(err) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    metrics::reconcile_passes_total()
                        .with_label_values(&["error"])
                        .inc();
                    warn!(
                        error = %err,
                        consecutive_failures,
                        "reconciliation pass failed, backing off"
                    );
                }
            }
        }
    }

    /// Delay before the next pass: the configured interval, doubled per
    /// consecutive failure up to the configured cap.
    fn next_delay(&self, consecutive_failures: u32) -> Duration {
        let multiplier = 1u32
            .checked_shl(consecutive_failures)
            .unwrap_or(self.max_backoff_multiplier)
            .min(self.max_backoff_multiplier);
        self.interval * multiplier
    }

    /// One reconciliation pass: fetch the gateway listing and fold every
    /// observed status into the registry.
    pub async fn run_once(&self) -> Result<PassSummary, GatewayError> {
        let listing = self.registry.gateway().list_connectors().await?;
        let observed: HashMap<String, ConnectorStatus> = listing
            .into_iter()
            .map(|entry| (entry.cid, entry.status))
            .collect();

        let locals = self.registry.store().all_connectors();
        let connectors = locals.len();
        let mut drift = 0usize;

        for local in locals {
            let gateway_status = match observed.get(&local.cid) {
                Some(status) => *status,
                // Known locally, gone at the gateway
                None => ConnectorStatus::Error,
            };

            if local.status == gateway_status {
                continue;
            }

            // Promotion out of a transitional state is the expected path,
            // not drift. Drift is a terminal local value the gateway
            // contradicts.
            let is_drift = local.status.is_observed();

            self.registry.apply_observed(&local.cid, gateway_status);

            if is_drift {
                drift += 1;
                metrics::drift_detected_total().inc();
                warn!(
                    cid = %local.cid,
                    local = %local.status,
                    gateway = %gateway_status,
                    "status drift corrected"
                );
                self.registry.store().append_log(
                    ConnectorLog::new(
                        &local.cid,
                        LogLevel::Warn,
                        "drift",
                        "local status corrected to gateway truth",
                    )
                    .with_data(serde_json::json!({
                        "local": local.status.name(),
                        "gateway": gateway_status.name(),
                    })),
                );
                self.events.publish(Event::DriftDetected {
                    cid: local.cid.clone(),
                    local: local.status,
                    gateway: gateway_status,
                });
            }
        }

        self.events.publish(Event::ReconcilePass {
            connectors,
            drift,
            at: Utc::now(),
        });
        Ok(PassSummary { connectors, drift })
    }
}
