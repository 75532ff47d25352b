//! Endpoint health monitor.
//!
//! Probes the primary and the replica on a fixed interval and publishes the
//! latest result per endpoint. The timer re-arms unconditionally: there is
//! no backoff, repeated failures are reported every time, and a slow probe
//! does not shift the schedule of the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use common::models::connection::Target;
use common::models::monitor::{EndpointHealth, HealthSnapshot};

use crate::backend::Backend;
use crate::gateway::Gateway;

/// Probe period used when none is configured.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(5000);

/// Periodic prober for both endpoints.
pub struct HealthMonitor<B> {
    gateway: Arc<Gateway<B>>,
    interval: Duration,
}

impl<B: Backend + 'static> HealthMonitor<B> {
    pub fn new(gateway: Arc<Gateway<B>>, interval: Duration) -> Self {
        Self { gateway, interval }
    }

    /// Probes one endpoint.
    pub async fn probe(&self, target: Target) -> EndpointHealth {
        self.gateway.check_health(target).await
    }

    /// Probes both endpoints concurrently; neither waits on the other.
    pub async fn probe_all(&self) -> HealthSnapshot {
        let (primary, replica) =
            tokio::join!(self.probe(Target::Primary), self.probe(Target::Replica));
        HealthSnapshot {
            primary: Some(primary),
            replica: Some(replica),
        }
    }

    /// Starts probing in a background task. The first probe runs immediately.
    pub fn spawn(self) -> MonitorHandle {
        let (tx, rx) = watch::channel(HealthSnapshot::default());
        let shutdown = Arc::new(Notify::new());
        let stop = shutdown.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                interval_ms = self.interval.as_millis() as u64,
                "health monitor started"
            );

            loop {
                tokio::select! {
                    _ = stop.notified() => {
                        tracing::info!("health monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let snapshot = self.probe_all().await;
                        for health in [&snapshot.primary, &snapshot.replica].into_iter().flatten() {
                            tracing::debug!(
                                endpoint = %health.endpoint,
                                reachable = health.reachable,
                                latency_ms = health.latency_ms,
                                "probe finished"
                            );
                        }
                        tx.send_replace(snapshot);
                    }
                }
            }
        });

        MonitorHandle {
            snapshot: rx,
            shutdown,
            task,
        }
    }
}

/// Handle to a running [`HealthMonitor`].
pub struct MonitorHandle {
    snapshot: watch::Receiver<HealthSnapshot>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Latest published snapshot.
    pub fn latest(&self) -> HealthSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every completed probe round.
    pub fn subscribe(&self) -> watch::Receiver<HealthSnapshot> {
        self.snapshot.clone()
    }

    /// Stops the monitor and waits for the task to exit.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "health monitor task ended abnormally");
        }
    }
}
