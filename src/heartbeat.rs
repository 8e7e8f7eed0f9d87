//! Per-channel heartbeat liveness window.
//!
//! Every heartbeat frame re-arms a timer. If the window elapses without
//! another beat the channel is marked not alive. Only liveness changes; the
//! socket stays open.

use crate::models::ChannelKey;
use crate::store::MarketStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Default liveness window.
pub const DEFAULT_HEARTBEAT_WINDOW: Duration = Duration::from_secs(10);

#[derive(Default)]
struct TimerState {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Liveness timer for one channel.
pub struct HeartbeatMonitor {
    channel: ChannelKey,
    owner: Uuid,
    window: Duration,
    store: Arc<MarketStore>,
    state: Arc<Mutex<TimerState>>,
}

impl HeartbeatMonitor {
    /// Creates a disarmed monitor writing liveness on behalf of `owner`.
    #[must_use]
    pub fn new(
        channel: ChannelKey,
        owner: Uuid,
        window: Duration,
        store: Arc<MarketStore>,
    ) -> Self {
        Self {
            channel,
            owner,
            window,
            store,
            state: Arc::new(Mutex::new(TimerState::default())),
        }
    }

    /// Liveness window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Records a heartbeat and restarts the window.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn beat(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        self.store.set_heartbeat(&self.channel, self.owner, true);

        let generation = state.generation;
        let window = self.window;
        let shared = Arc::clone(&self.state);
        let store = Arc::clone(&self.store);
        let channel = self.channel.clone();
        let owner = self.owner;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let state = shared.lock();
            if state.generation == generation {
                debug!(channel = %channel, window_ms = window.as_millis() as u64, "Heartbeat window elapsed");
                store.set_heartbeat(&channel, owner, false);
            }
        }));
    }

    /// Cancels the timer and marks the channel not alive.
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        self.store.set_heartbeat(&self.channel, self.owner, false);
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("channel", &self.channel)
            .field("window", &self.window)
            .finish()
    }
}
