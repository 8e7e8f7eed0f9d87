//! Option Chain Dashboard streaming core
//!
//! Connects the configured channels to the broker gateway and logs the
//! throttled UI views until interrupted.

use gateway_client::GatewayClient;
use option_chain_dashboard::config::Config;
use option_chain_dashboard::health::{BackendEvent, HealthMonitor};
use option_chain_dashboard::state::DashboardState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,option_chain_dashboard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("DASHBOARD_CONFIG") {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            Config::load(&path)?
        }
        Err(_) => Config::default(),
    };

    let client = GatewayClient::new(config.gateway.client_config())?;
    info!(
        "Starting option chain dashboard against {}",
        client.base_url()
    );

    let state = DashboardState::from_config(config, client.clone());
    let connections = state.connect_configured()?;
    info!("Connected {} configured channels", connections.len());

    // Restart detection
    let monitor = state.config.health.enabled.then(|| {
        HealthMonitor::spawn(
            Arc::new(client),
            Duration::from_millis(state.config.health.interval_ms),
        )
    });
    if let Some(monitor) = &monitor {
        let mut events = monitor.subscribe();
        let registry = state.registry.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(BackendEvent::Restarted) => registry.handle_backend_restart().await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Health events lagged, skipped {}", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    // Render loop stand-in
    let mut views = state.projection.subscribe();
    let render = tokio::spawn(async move {
        while views.changed().await.is_ok() {
            let view = views.borrow_and_update().clone();
            info!(
                sequence = view.sequence,
                spot = ?view.spot,
                strikes = ?view.option_chain.as_ref().map(|c| c.strike_count()),
                heartbeat = view.heartbeat_alive,
                stale = view.stale,
                error = ?view.connection_error,
                "UI view"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(monitor) = &monitor {
        monitor.stop();
    }
    render.abort();
    state.registry.disconnect_all().await;

    Ok(())
}
