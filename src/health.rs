//! Backend health polling and restart detection.
//!
//! A restart is inferred from the gateway going unreachable and coming back.
//! The push session does not survive a gateway restart, so consumers react to
//! [`BackendEvent::Restarted`] by calling
//! [`ConnectionRegistry::handle_backend_restart`](crate::registry::ConnectionRegistry::handle_backend_restart).

use futures::FutureExt;
use futures::future::BoxFuture;
use gateway_client::GatewayClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default poll interval.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// Reachability check against the gateway.
pub trait HealthProbe: Send + Sync + 'static {
    /// Resolves to `true` when the gateway is reachable and healthy.
    fn probe(&self) -> BoxFuture<'static, bool>;
}

impl HealthProbe for GatewayClient {
    fn probe(&self) -> BoxFuture<'static, bool> {
        let client = self.clone();
        async move {
            match client.health_check().await {
                Ok(health) => health.is_ok(),
                Err(err) => {
                    debug!(error = %err, "Health check failed");
                    false
                }
            }
        }
        .boxed()
    }
}

/// Reachability transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    /// The gateway stopped answering.
    Unreachable,
    /// First successful probe.
    Reachable,
    /// The gateway answered again after being unreachable.
    Restarted,
}

/// Last known reachability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Reachability {
    /// No probe completed yet.
    #[default]
    Unknown,
    /// Last probe succeeded.
    Up,
    /// Last probe failed.
    Down,
}

/// Applies one probe result. Returns the new reachability and the event to
/// publish, if any.
#[must_use]
pub fn transition(previous: Reachability, healthy: bool) -> (Reachability, Option<BackendEvent>) {
    match (previous, healthy) {
        (Reachability::Unknown, true) => (Reachability::Up, Some(BackendEvent::Reachable)),
        (Reachability::Down, true) => (Reachability::Up, Some(BackendEvent::Restarted)),
        (Reachability::Up, true) => (Reachability::Up, None),
        (Reachability::Down, false) => (Reachability::Down, None),
        (_, false) => (Reachability::Down, Some(BackendEvent::Unreachable)),
    }
}

/// Background poller publishing [`BackendEvent`]s.
#[derive(Debug)]
pub struct HealthMonitor {
    events: broadcast::Sender<BackendEvent>,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    /// Starts polling `probe` every `interval`. The first probe runs at once.
    #[must_use]
    pub fn spawn(probe: Arc<dyn HealthProbe>, interval: Duration) -> Self {
        let (events, _) = broadcast::channel(16);
        let task = tokio::spawn(poll(probe, interval, events.clone()));
        Self { events, task }
    }

    /// Receiver of events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    /// Stops polling.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll(
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
    events: broadcast::Sender<BackendEvent>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut reachability = Reachability::Unknown;

    loop {
        ticker.tick().await;
        let healthy = probe.probe().await;
        let (next, event) = transition(reachability, healthy);
        reachability = next;

        let Some(event) = event else {
            continue;
        };
        match event {
            BackendEvent::Unreachable => warn!("Gateway unreachable"),
            BackendEvent::Reachable => info!("Gateway reachable"),
            BackendEvent::Restarted => warn!("Gateway back after outage, treating as restart"),
        }
        // No receivers is fine; events are edge-triggered.
        let _ = events.send(event);
    }
}
