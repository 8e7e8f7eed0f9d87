//! Process-wide registry of push channels.
//!
//! At most one socket exists per [`ChannelKey`]. Each registered channel owns
//! one supervisor task that drives the socket through init, open, frame
//! dispatch, close and reconnect. Consumers either pin a channel with
//! [`ConnectionRegistry::connect`] or hold a [`ChannelLease`] that stops the
//! channel when the last lease is dropped.

mod supervisor;


use crate::backoff::BackoffPolicy;
use crate::error::StreamError;
use crate::heartbeat::DEFAULT_HEARTBEAT_WINDOW;
use crate::init_gate::InitGate;
use crate::models::{ChannelEndpoint, ChannelKey, ConnectionState};
use crate::store::MarketStore;
use crate::transport::Connector;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use supervisor::Supervisor;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Registry settings shared by every channel.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Reconnect policy.
    pub backoff: BackoffPolicy,
    /// Heartbeat liveness window.
    pub heartbeat_window: Duration,
    /// Base URL that push routes are resolved against (e.g., `ws://host:8000`).
    pub ws_base_url: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            heartbeat_window: DEFAULT_HEARTBEAT_WINDOW,
            ws_base_url: "ws://localhost:8000".to_string(),
        }
    }
}

/// Publishes a channel's state to its [`Connection`] handles and the store.
///
/// Store writes carry the registration id, so a replaced registration that is
/// still shutting down cannot overwrite its successor.
#[derive(Clone)]
struct StateReporter {
    channel: ChannelKey,
    owner: Uuid,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    store: Arc<MarketStore>,
}

impl StateReporter {
    fn claim(&self) {
        self.store.claim_channel(&self.channel, self.owner);
    }

    fn set(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
        self.store.set_connection_state(&self.channel, self.owner, state);
    }
}

struct RunningTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RunningTask {
    async fn stop(self) {
        self.shutdown_tx.send_replace(true);
        if let Err(err) = self.handle.await
            && err.is_panic()
        {
            warn!(error = %err, "Channel supervisor panicked");
        }
    }
}

struct ChannelEntry {
    endpoint: ChannelEndpoint,
    connection: Connection,
    reporter: StateReporter,
    task: Mutex<Option<RunningTask>>,
    leases: AtomicUsize,
    pinned: AtomicBool,
}

impl ChannelEntry {
    fn is_active(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Spawns a supervisor unless one is already running.
    fn start(&self, shared: &Shared) {
        let mut task = self.task.lock();
        if task
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            return;
        }

        self.reporter.claim();
        self.reporter.set(ConnectionState::Connecting);
        self.connection.retry_attempts.store(0, Ordering::Release);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = Supervisor {
            channel: self.connection.channel.clone(),
            url: self.connection.url.clone(),
            reporter: self.reporter.clone(),
            retry_attempts: Arc::clone(&self.connection.retry_attempts),
            init_gate: Arc::clone(&shared.init_gate),
            connector: Arc::clone(&shared.connector),
            backoff: shared.settings.backoff,
            heartbeat_window: shared.settings.heartbeat_window,
        };
        let handle = tokio::spawn(supervisor.run(shutdown_rx));
        *task = Some(RunningTask {
            shutdown_tx,
            handle,
        });
    }

    /// Signals the supervisor and waits for it to finish.
    async fn stop(&self) {
        let running = self.task.lock().take();
        if let Some(running) = running {
            running.stop().await;
        }
        self.connection.retry_attempts.store(0, Ordering::Release);
    }
}

struct Shared {
    channels: DashMap<ChannelKey, Arc<ChannelEntry>>,
    store: Arc<MarketStore>,
    init_gate: Arc<InitGate>,
    connector: Arc<dyn Connector>,
    settings: RegistrySettings,
}

impl Shared {
    /// Drops a removed registration's state from the store. A no-op once the
    /// key was registered again.
    fn forget(&self, entry: &ChannelEntry) {
        self.store.forget_channel(&entry.connection.channel, entry.connection.id);
    }

    /// Whether `entry` is still the registration under its key.
    fn is_registered(&self, entry: &Arc<ChannelEntry>) -> bool {
        self.channels
            .get(&entry.connection.channel)
            .is_some_and(|current| Arc::ptr_eq(current.value(), entry))
    }
}

/// Handle to the process-wide channel registry. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionRegistry {
    shared: Arc<Shared>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        store: Arc<MarketStore>,
        init_gate: Arc<InitGate>,
        connector: Arc<dyn Connector>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                channels: DashMap::new(),
                store,
                init_gate,
                connector,
                settings,
            }),
        }
    }

    /// Store the channels write into.
    #[must_use]
    pub fn store(&self) -> &Arc<MarketStore> {
        &self.shared.store
    }

    /// Registry settings.
    #[must_use]
    pub fn settings(&self) -> &RegistrySettings {
        &self.shared.settings
    }

    /// Connects a channel, or returns the existing connection for `key`.
    ///
    /// The channel stays registered until [`disconnect`](Self::disconnect).
    ///
    /// # Errors
    /// Returns [`StreamError::Transport`] if the endpoint URL cannot be built.
    pub fn connect(
        &self,
        key: impl Into<ChannelKey>,
        endpoint: ChannelEndpoint,
    ) -> Result<Connection, StreamError> {
        let entry = self.register(key.into(), endpoint, |entry| {
            entry.pinned.store(true, Ordering::Release);
        })?;
        Ok(entry.connection.clone())
    }

    /// Attaches to a channel, connecting it if needed.
    ///
    /// Dropping the last lease stops a channel that was never pinned with
    /// [`connect`](Self::connect).
    ///
    /// # Errors
    /// Returns [`StreamError::Transport`] if the endpoint URL cannot be built.
    pub fn acquire(
        &self,
        key: impl Into<ChannelKey>,
        endpoint: ChannelEndpoint,
    ) -> Result<ChannelLease, StreamError> {
        let entry = self.register(key.into(), endpoint, |entry| {
            entry.leases.fetch_add(1, Ordering::AcqRel);
        })?;
        Ok(ChannelLease {
            shared: Arc::clone(&self.shared),
            entry,
        })
    }

    fn register(
        &self,
        key: ChannelKey,
        endpoint: ChannelEndpoint,
        attach: impl FnOnce(&ChannelEntry),
    ) -> Result<Arc<ChannelEntry>, StreamError> {
        let shared = &self.shared;
        match shared.channels.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                let entry = Arc::clone(occupied.get());
                if entry.endpoint != endpoint {
                    warn!(channel = %key, "Channel already registered with another endpoint, keeping it");
                }
                attach(&entry);
                if entry.is_active() {
                    debug!(channel = %key, id = %entry.connection.id, "Reusing active channel");
                } else {
                    info!(channel = %key, "Reviving stopped channel");
                    entry.start(shared);
                }
                Ok(entry)
            }
            Entry::Vacant(vacant) => {
                let url = endpoint.url(&shared.settings.ws_base_url)?;
                let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
                let id = Uuid::new_v4();
                let connection = Connection {
                    id,
                    channel: key.clone(),
                    url,
                    state_rx,
                    retry_attempts: Arc::new(AtomicU32::new(0)),
                };
                let entry = Arc::new(ChannelEntry {
                    endpoint,
                    reporter: StateReporter {
                        channel: key.clone(),
                        owner: id,
                        state_tx: Arc::new(state_tx),
                        store: Arc::clone(&shared.store),
                    },
                    connection,
                    task: Mutex::new(None),
                    leases: AtomicUsize::new(0),
                    pinned: AtomicBool::new(false),
                });
                attach(&entry);
                info!(channel = %key, id = %entry.connection.id, url = %entry.connection.url, "Registering channel");
                entry.start(shared);
                vacant.insert(Arc::clone(&entry));
                Ok(entry)
            }
        }
    }

    /// Closes a channel with code 1000 and waits until its supervisor exits.
    ///
    /// Returns `false` if no channel is registered under `key`.
    pub async fn disconnect(&self, key: &ChannelKey) -> bool {
        let Some((_, entry)) = self.shared.channels.remove(key) else {
            return false;
        };
        info!(channel = %key, "Disconnecting channel");
        entry.stop().await;
        self.shared.forget(&entry);
        true
    }

    /// Disconnects every channel.
    pub async fn disconnect_all(&self) {
        let keys = self.channels();
        join_all(keys.iter().map(|key| self.disconnect(key))).await;
    }

    /// Restarts a channel from a clean retry state.
    ///
    /// # Errors
    /// Returns [`StreamError::UnknownChannel`] if `key` is not registered.
    pub async fn reconnect(&self, key: &ChannelKey) -> Result<Connection, StreamError> {
        let entry = self
            .shared
            .channels
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StreamError::UnknownChannel(key.clone()))?;

        info!(channel = %key, "Reconnecting channel");
        entry.stop().await;
        if !self.shared.is_registered(&entry) {
            return Err(StreamError::UnknownChannel(key.clone()));
        }
        entry.start(&self.shared);
        Ok(entry.connection.clone())
    }

    /// Handles a backend restart: the push session is gone server-side.
    ///
    /// Stops every supervisor, clears the init token and the read-model, then
    /// restarts every registered channel through the init gate again.
    pub async fn handle_backend_restart(&self) {
        let entries: Vec<Arc<ChannelEntry>> = self
            .shared
            .channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        warn!(channels = entries.len(), "Backend restart detected, re-establishing channels");

        join_all(entries.iter().map(|entry| entry.stop())).await;
        self.shared.init_gate.clear();
        self.shared.store.reset();

        for entry in entries.iter().filter(|entry| self.shared.is_registered(entry)) {
            entry.start(&self.shared);
        }
    }

    /// Connection for `key`, if registered.
    #[must_use]
    pub fn connection(&self, key: &ChannelKey) -> Option<Connection> {
        self.shared
            .channels
            .get(key)
            .map(|entry| entry.connection.clone())
    }

    /// Registered channel keys, sorted.
    #[must_use]
    pub fn channels(&self) -> Vec<ChannelKey> {
        let mut keys: Vec<ChannelKey> = self
            .shared
            .channels
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("channels", &self.channels())
            .field("settings", &self.shared.settings)
            .finish()
    }
}

/// Observer handle for one channel.
#[derive(Debug, Clone)]
pub struct Connection {
    id: Uuid,
    channel: ChannelKey,
    url: Url,
    state_rx: watch::Receiver<ConnectionState>,
    retry_attempts: Arc<AtomicU32>,
}

impl Connection {
    /// Identity of the registered channel; stable across reconnects.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Channel key.
    #[must_use]
    pub fn channel(&self) -> &ChannelKey {
        &self.channel
    }

    /// Push URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver of state changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Waits until the channel reaches `state`.
    ///
    /// Returns `false` if the channel was dropped first.
    pub async fn wait_for(&self, state: ConnectionState) -> bool {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|current| *current == state).await.is_ok()
    }

    /// Retries scheduled since the last successful open.
    #[must_use]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.load(Ordering::Acquire)
    }
}

/// Counted attachment to a channel.
pub struct ChannelLease {
    shared: Arc<Shared>,
    entry: Arc<ChannelEntry>,
}

impl ChannelLease {
    /// Connection of the leased channel.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.entry.connection
    }
}

impl std::fmt::Debug for ChannelLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLease")
            .field("channel", &self.entry.connection.channel)
            .finish()
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        let remaining = self.entry.leases.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining > 0 || self.entry.pinned.load(Ordering::Acquire) {
            return;
        }

        let channel = self.entry.connection.channel.clone();
        let removed = self.shared.channels.remove_if(&channel, |_, entry| {
            Arc::ptr_eq(entry, &self.entry)
                && entry.leases.load(Ordering::Acquire) == 0
                && !entry.pinned.load(Ordering::Acquire)
        });
        if removed.is_none() {
            return;
        }

        info!(channel = %channel, "Last lease released, stopping channel");
        let running = self.entry.task.lock().take();
        let Some(running) = running else {
            self.shared.forget(&self.entry);
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared = Arc::clone(&self.shared);
                let entry = Arc::clone(&self.entry);
                runtime.spawn(async move {
                    running.stop().await;
                    shared.forget(&entry);
                });
            }
            Err(_) => {
                running.shutdown_tx.send_replace(true);
            }
        }
    }
}
