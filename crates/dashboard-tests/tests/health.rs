//! Health check and backend restart tests.

use dashboard_tests::{MockGateway, eventually};
use option_chain_dashboard::health::{BackendEvent, HealthMonitor, HealthProbe};
use option_chain_dashboard::models::{ChannelEndpoint, ConnectionState};
use option_chain_dashboard::state::DashboardState;
use std::sync::Arc;
use std::time::Duration;

async fn next_event(events: &mut tokio::sync::broadcast::Receiver<BackendEvent>) -> BackendEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("Timed out waiting for health event")
        .expect("Health event channel closed")
}

#[tokio::test]
async fn test_health_check() {
    let gateway = MockGateway::start().await.expect("Failed to start gateway");
    let client = gateway.client();

    let health = client.health_check().await.expect("Health check failed");

    assert_eq!(health.status, "ok");
    assert!(health.is_ok());
    assert!(client.probe().await);

    gateway.set_healthy(false);
    assert!(!client.probe().await);
}

#[tokio::test]
async fn test_monitor_detects_restart() {
    let gateway = MockGateway::start().await.expect("Failed to start gateway");
    let monitor = HealthMonitor::spawn(Arc::new(gateway.client()), Duration::from_millis(50));
    let mut events = monitor.subscribe();

    assert_eq!(next_event(&mut events).await, BackendEvent::Reachable);

    gateway.set_healthy(false);
    assert_eq!(next_event(&mut events).await, BackendEvent::Unreachable);

    gateway.set_healthy(true);
    assert_eq!(next_event(&mut events).await, BackendEvent::Restarted);
}

#[tokio::test]
async fn test_backend_restart_reinitializes_session() {
    let gateway = MockGateway::start().await.expect("Failed to start gateway");
    let state = DashboardState::from_config(gateway.config(), gateway.client());
    let connection = state
        .registry
        .connect("NIFTY-tick", ChannelEndpoint::market_tick("NIFTY"))
        .expect("Failed to connect");
    assert!(connection.wait_for(ConnectionState::Connected).await);
    assert!(gateway.wait_for_sockets(1).await);
    gateway.push(r#"{"type":"market_tick","data":{"ltp":100.5}}"#);
    assert!(eventually(|| state.store.snapshot().spot == Some(100.5)).await);

    state.registry.handle_backend_restart().await;

    assert!(state.store.snapshot().spot.is_none());
    assert!(gateway.wait_for_sockets(2).await);
    assert!(connection.wait_for(ConnectionState::Connected).await);
    assert_eq!(gateway.init_calls(), 2);
    assert!(state.init_gate.is_initialized());

    state.registry.disconnect_all().await;
}
