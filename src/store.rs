//! The single read-model of latest known market state.
//!
//! [`MarketStore`] is the only writer-facing handle. Its mutators are
//! crate-private: the dispatcher and the registry write, UI consumers read
//! snapshots or follow the revision counter through [`MarketStore::subscribe`].
//!
//! Per-channel state is written on behalf of an owner: the registration that
//! last claimed the channel. Writes from a previous owner that is still
//! shutting down are ignored, so a remounted channel never shows the old
//! socket's close.

use crate::models::{ChannelKey, ConnectionState, OptionChain};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::trace;
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Snapshot of the latest known market state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadModel {
    /// Last known good underlying price.
    pub spot: Option<f64>,
    /// Latest option chain snapshot.
    pub option_chain: Option<Arc<OptionChain>>,
    /// True while any channel is inside its heartbeat liveness window.
    pub heartbeat_alive: bool,
    /// Wall-clock time of the last accepted data mutation.
    pub last_update: Option<DateTime<Utc>>,
    /// Monotonic twin of `last_update`, used for staleness.
    pub last_update_at: Option<Instant>,
    /// Error to surface to the user.
    ///
    /// A channel that gave up reconnecting keeps its error here until that
    /// channel opens again. Otherwise this is the last transient error,
    /// cleared by the next successful event on any channel.
    pub connection_error: Option<String>,
    /// Connection state per channel.
    pub connections: BTreeMap<ChannelKey, ConnectionState>,
    /// Bumped on every accepted mutation.
    pub revision: u64,
}

impl ReadModel {
    /// Whether no data mutation was accepted within `threshold` of `now`.
    ///
    /// A model that never received data is stale.
    #[must_use]
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        self.last_update_at
            .is_none_or(|at| now.saturating_duration_since(at) >= threshold)
    }

    /// State of one channel, `Disconnected` if unknown.
    #[must_use]
    pub fn connection_state(&self, channel: &ChannelKey) -> ConnectionState {
        self.connections.get(channel).copied().unwrap_or_default()
    }

    /// Whether any channel is connected.
    #[must_use]
    pub fn any_connected(&self) -> bool {
        self.connections
            .values()
            .any(|state| *state == ConnectionState::Connected)
    }

    /// Chain for `symbol`, if the latest snapshot belongs to it.
    ///
    /// Legacy snapshots carry no symbol and match any request.
    #[must_use]
    pub fn chain_for(&self, symbol: &str) -> Option<&OptionChain> {
        self.option_chain
            .as_deref()
            .filter(|chain| chain.symbol.as_deref().is_none_or(|s| s == symbol))
    }
}

#[derive(Debug, Default)]
struct Inner {
    model: ReadModel,
    alive_channels: BTreeSet<ChannelKey>,
    owners: BTreeMap<ChannelKey, Uuid>,
    transient_error: Option<String>,
    terminal_errors: BTreeMap<ChannelKey, String>,
}

impl Inner {
    /// Unclaimed channels accept any writer.
    fn owns(&self, channel: &ChannelKey, owner: Uuid) -> bool {
        self.owners.get(channel).is_none_or(|current| *current == owner)
    }

    fn refresh_heartbeat(&mut self) {
        self.model.heartbeat_alive = !self.alive_channels.is_empty();
    }

    /// Terminal errors win over transient ones. Returns whether the surfaced
    /// error changed.
    fn refresh_error(&mut self) -> bool {
        let next = self
            .terminal_errors
            .values()
            .next()
            .or(self.transient_error.as_ref())
            .cloned();
        let changed = self.model.connection_error != next;
        self.model.connection_error = next;
        changed
    }

    fn touch(&mut self) {
        self.model.last_update = Some(Utc::now());
        self.model.last_update_at = Some(Instant::now());
        self.transient_error = None;
        self.refresh_error();
    }
}

/// Shared owner of the [`ReadModel`].
#[derive(Debug)]
pub struct MarketStore {
    inner: RwLock<Inner>,
    revision_tx: watch::Sender<u64>,
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner::default()),
            revision_tx,
        }
    }

    /// Clones the current read-model.
    #[must_use]
    pub fn snapshot(&self) -> ReadModel {
        self.inner.read().model.clone()
    }

    /// Current revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.read().model.revision
    }

    /// Receiver that changes on every accepted mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    pub(crate) fn update_spot(&self, spot: f64) {
        self.mutate(|inner| {
            inner.model.spot = Some(spot);
            inner.touch();
            true
        });
    }

    /// Replaces the chain wholesale; never merges rows.
    pub(crate) fn replace_chain(&self, chain: OptionChain, spot: Option<f64>) {
        self.mutate(|inner| {
            inner.model.option_chain = Some(Arc::new(chain));
            if let Some(spot) = spot {
                inner.model.spot = Some(spot);
            }
            inner.touch();
            true
        });
    }

    /// Hands `channel` to `owner`. Liveness left by a previous owner is dropped.
    pub(crate) fn claim_channel(&self, channel: &ChannelKey, owner: Uuid) {
        self.mutate(|inner| {
            if inner.owners.insert(channel.clone(), owner) == Some(owner) {
                return false;
            }
            let was_alive = inner.alive_channels.remove(channel);
            inner.refresh_heartbeat();
            was_alive
        });
    }

    pub(crate) fn set_heartbeat(&self, channel: &ChannelKey, owner: Uuid, alive: bool) {
        self.mutate(|inner| {
            if !inner.owns(channel, owner) {
                return false;
            }
            let changed = if alive {
                inner.alive_channels.insert(channel.clone())
            } else {
                inner.alive_channels.remove(channel)
            };
            inner.refresh_heartbeat();
            if alive {
                inner.transient_error = None;
                inner.refresh_error();
            }
            changed || alive
        });
    }

    pub(crate) fn set_connection_state(
        &self,
        channel: &ChannelKey,
        owner: Uuid,
        state: ConnectionState,
    ) {
        self.mutate(|inner| {
            inner.owns(channel, owner)
                && inner.model.connections.insert(channel.clone(), state) != Some(state)
        });
    }

    pub(crate) fn forget_channel(&self, channel: &ChannelKey, owner: Uuid) {
        self.mutate(|inner| {
            if !inner.owns(channel, owner) {
                return false;
            }
            inner.owners.remove(channel);
            let removed = inner.model.connections.remove(channel).is_some();
            let was_alive = inner.alive_channels.remove(channel);
            inner.refresh_heartbeat();
            inner.terminal_errors.remove(channel);
            let error_changed = inner.refresh_error();
            removed || was_alive || error_changed
        });
    }

    /// Records a transient error.
    pub(crate) fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.mutate(|inner| {
            inner.transient_error = Some(message);
            inner.refresh_error()
        });
    }

    /// Records an error that stays until `channel` opens again.
    pub(crate) fn record_terminal_error(
        &self,
        channel: &ChannelKey,
        owner: Uuid,
        message: impl Into<String>,
    ) {
        let message = message.into();
        self.mutate(|inner| {
            if !inner.owns(channel, owner) {
                return false;
            }
            inner.terminal_errors.insert(channel.clone(), message);
            inner.refresh_error()
        });
    }

    /// Clears the transient error and any terminal error of `channel`.
    pub(crate) fn clear_channel_error(&self, channel: &ChannelKey, owner: Uuid) {
        self.mutate(|inner| {
            if !inner.owns(channel, owner) {
                return false;
            }
            inner.transient_error = None;
            inner.terminal_errors.remove(channel);
            inner.refresh_error()
        });
    }

    /// Logical reset: market data, liveness and errors go, channel states stay.
    pub(crate) fn reset(&self) {
        self.mutate(|inner| {
            let connections = std::mem::take(&mut inner.model.connections);
            let revision = inner.model.revision;
            inner.model = ReadModel {
                connections,
                revision,
                ..ReadModel::default()
            };
            inner.alive_channels.clear();
            inner.transient_error = None;
            inner.terminal_errors.clear();
            true
        });
    }

    fn mutate(&self, apply: impl FnOnce(&mut Inner) -> bool) {
        let revision = {
            let mut inner = self.inner.write();
            if !apply(&mut inner) {
                return;
            }
            inner.model.revision += 1;
            inner.model.revision
        };
        trace!(revision, "Read-model updated");
        self.revision_tx.send_replace(revision);
    }
}
