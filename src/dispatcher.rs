//! Applies inbound frames of one channel to the read-model.

use crate::frame::Frame;
use crate::heartbeat::HeartbeatMonitor;
use crate::models::ChannelKey;
use crate::store::MarketStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};
use uuid::Uuid;

/// Routes classified frames of one channel into the [`MarketStore`].
#[derive(Debug)]
pub struct Dispatcher {
    channel: ChannelKey,
    store: Arc<MarketStore>,
    heartbeat: HeartbeatMonitor,
}

impl Dispatcher {
    /// Creates a dispatcher for `channel` owned by the registration `owner`.
    #[must_use]
    pub fn new(
        channel: ChannelKey,
        owner: Uuid,
        store: Arc<MarketStore>,
        heartbeat_window: Duration,
    ) -> Self {
        let heartbeat =
            HeartbeatMonitor::new(channel.clone(), owner, heartbeat_window, Arc::clone(&store));
        Self {
            channel,
            store,
            heartbeat,
        }
    }

    /// Channel this dispatcher serves.
    #[must_use]
    pub fn channel(&self) -> &ChannelKey {
        &self.channel
    }

    /// Parses and applies one raw text frame.
    ///
    /// Frames that fail to parse or classify are logged and dropped; the
    /// read-model is left untouched and the connection stays up.
    pub fn dispatch(&self, raw: &str) {
        match Frame::parse(raw) {
            Ok(frame) => self.apply(frame),
            Err(err) => {
                warn!(channel = %self.channel, error = %err, "Dropping inbound frame");
            }
        }
    }

    /// Applies an already classified frame.
    pub fn apply(&self, frame: Frame) {
        trace!(channel = %self.channel, kind = frame.label(), "Applying frame");
        match frame {
            Frame::Heartbeat => self.heartbeat.beat(),
            Frame::MarketTick(tick) => self.store.update_spot(tick.ltp),
            Frame::ChainUpdate(payload) | Frame::LegacyChain(payload) => {
                let (chain, spot) = payload.into_parts();
                self.store.replace_chain(chain, spot);
            }
        }
    }

    /// Called when the socket closes; liveness drops immediately.
    pub fn on_close(&self) {
        self.heartbeat.disarm();
    }
}
