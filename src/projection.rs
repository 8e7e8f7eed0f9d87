//! Throttled UI projection of the read-model.
//!
//! The store may change hundreds of times per second. Consumers receive at
//! most one [`UiView`] per interval, always built from the latest snapshot, so
//! a burst of updates collapses into one emission and the final state is never
//! lost.

use crate::models::{ChannelKey, ConnectionState, OptionChain};
use crate::store::{MarketStore, ReadModel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default minimum interval between emitted views.
pub const DEFAULT_PROJECTION_INTERVAL: Duration = Duration::from_millis(100);
/// Default age after which data is flagged stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(15);

/// Projection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionSettings {
    /// Minimum interval between emissions.
    pub interval: Duration,
    /// Data older than this is flagged stale.
    pub stale_after: Duration,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PROJECTION_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// What a UI consumer renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UiView {
    /// Emission counter, starting at 1 for the first emitted view.
    pub sequence: u64,
    /// Underlying price.
    pub spot: Option<f64>,
    /// Latest chain.
    pub option_chain: Option<Arc<OptionChain>>,
    /// Aggregate heartbeat liveness.
    pub heartbeat_alive: bool,
    /// True when no data arrived within the stale threshold.
    pub stale: bool,
    /// Error to show; a channel that gave up keeps its error here.
    pub connection_error: Option<String>,
    /// Time of the last data update.
    pub last_update: Option<DateTime<Utc>>,
    /// Per-channel connection state.
    pub connections: BTreeMap<ChannelKey, ConnectionState>,
}

/// Builds a view from a snapshot. `sequence` is left at zero.
#[must_use]
pub fn project(model: &ReadModel, now: Instant, stale_after: Duration) -> UiView {
    UiView {
        sequence: 0,
        spot: model.spot,
        option_chain: model.option_chain.clone(),
        heartbeat_alive: model.heartbeat_alive,
        stale: model.is_stale(now, stale_after),
        connection_error: model.connection_error.clone(),
        last_update: model.last_update,
        connections: model.connections.clone(),
    }
}

/// Background task publishing throttled views.
#[derive(Debug)]
pub struct ThrottledProjection {
    view_rx: watch::Receiver<UiView>,
    task: JoinHandle<()>,
}

impl ThrottledProjection {
    /// Spawns the projection task.
    #[must_use]
    pub fn spawn(store: Arc<MarketStore>, settings: ProjectionSettings) -> Self {
        let (view_tx, view_rx) = watch::channel(UiView::default());
        let mut revisions = store.subscribe();
        if store.revision() > 0 {
            revisions.mark_changed();
        }
        let task = tokio::spawn(run(store, revisions, settings, view_tx));
        Self { view_rx, task }
    }

    /// Receiver of emitted views.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UiView> {
        self.view_rx.clone()
    }

    /// Last emitted view.
    #[must_use]
    pub fn latest(&self) -> UiView {
        self.view_rx.borrow().clone()
    }
}

impl Drop for ThrottledProjection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    store: Arc<MarketStore>,
    mut revisions: watch::Receiver<u64>,
    settings: ProjectionSettings,
    view_tx: watch::Sender<UiView>,
) {
    let mut sequence = 0u64;
    let mut last_emit: Option<Instant> = None;
    let mut last_stale = true;

    loop {
        // Wait for a mutation, or for fresh data to age past the threshold.
        let stale_deadline = store
            .snapshot()
            .last_update_at
            .filter(|_| !last_stale)
            .map(|at| at + settings.stale_after);
        match stale_deadline {
            Some(deadline) => {
                tokio::select! {
                    changed = revisions.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => {
                if revisions.changed().await.is_err() {
                    break;
                }
            }
        }

        if let Some(at) = last_emit {
            tokio::time::sleep_until(at + settings.interval).await;
        }
        revisions.borrow_and_update();

        let now = Instant::now();
        sequence += 1;
        let view = UiView {
            sequence,
            ..project(&store.snapshot(), now, settings.stale_after)
        };
        last_stale = view.stale;
        last_emit = Some(now);
        trace!(sequence, stale = view.stale, "Emitting UI view");
        if view_tx.send(view).is_err() {
            debug!("All UI view receivers dropped, projection stopping");
            break;
        }
    }
}
