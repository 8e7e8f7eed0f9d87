//! Application state management.

use crate::config::Config;
use crate::error::StreamError;
use crate::init_gate::{InitGate, SessionInitializer};
use crate::projection::{ThrottledProjection, UiView};
use crate::registry::{Connection, ConnectionRegistry};
use crate::store::MarketStore;
use crate::transport::{Connector, TungsteniteConnector};
use gateway_client::GatewayClient;
use std::sync::Arc;
use tracing::info;

/// Streaming core shared by every UI consumer.
#[derive(Clone)]
pub struct DashboardState {
    /// The read-model.
    pub store: Arc<MarketStore>,
    /// Push session gate.
    pub init_gate: Arc<InitGate>,
    /// Channel registry.
    pub registry: ConnectionRegistry,
    /// Throttled UI views.
    pub projection: Arc<ThrottledProjection>,
    /// Application configuration.
    pub config: Config,
}

impl DashboardState {
    /// Creates the state from configuration with the production transport.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn from_config(config: Config, client: GatewayClient) -> Self {
        let connector = TungsteniteConnector::new(config.stream.connect_timeout());
        Self::with_parts(config, Arc::new(client), Arc::new(connector))
    }

    /// Creates the state around explicit init and transport implementations.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_parts(
        config: Config,
        initializer: Arc<dyn SessionInitializer>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let store = Arc::new(MarketStore::new());
        let init_gate = Arc::new(InitGate::new(initializer));
        let registry = ConnectionRegistry::new(
            Arc::clone(&store),
            Arc::clone(&init_gate),
            connector,
            config.registry_settings(),
        );
        let projection = Arc::new(ThrottledProjection::spawn(
            Arc::clone(&store),
            config.projection.settings(),
        ));

        Self {
            store,
            init_gate,
            registry,
            projection,
            config,
        }
    }

    /// Connects every channel listed in the configuration.
    ///
    /// # Errors
    /// Returns the first channel whose endpoint URL cannot be built.
    pub fn connect_configured(&self) -> Result<Vec<Connection>, StreamError> {
        self.config
            .channels
            .iter()
            .map(|channel| {
                let key = channel.channel_key();
                info!(channel = %key, kind = %channel.kind, symbol = %channel.symbol, "Connecting configured channel");
                self.registry.connect(key, channel.endpoint())
            })
            .collect()
    }

    /// Last emitted UI view.
    #[must_use]
    pub fn view(&self) -> UiView {
        self.projection.latest()
    }
}

impl std::fmt::Debug for DashboardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardState")
            .field("registry", &self.registry)
            .field("init_gate", &self.init_gate)
            .finish_non_exhaustive()
    }
}
