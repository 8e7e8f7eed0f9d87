//! Stream session init tests.

use dashboard_tests::{MockGateway, eventually};
use futures_util::future::join_all;
use option_chain_dashboard::error::InitError;
use option_chain_dashboard::init_gate::InitGate;
use option_chain_dashboard::models::{ChannelEndpoint, ConnectionState};
use option_chain_dashboard::state::DashboardState;
use std::sync::Arc;

#[tokio::test]
async fn test_concurrent_init_issues_one_request() {
    let gateway = MockGateway::start().await.expect("Failed to start gateway");
    let gate = InitGate::new(Arc::new(gateway.client()));

    let results = join_all((0..10).map(|_| gate.ensure_initialized())).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(gateway.init_calls(), 1);
    assert!(gate.is_initialized());

    gate.ensure_initialized().await.expect("Init failed");
    assert_eq!(gateway.init_calls(), 1);
}

#[tokio::test]
async fn test_rejected_init_surfaces_message() {
    let gateway = MockGateway::start().await.expect("Failed to start gateway");
    gateway.set_init_failing(true);
    let gate = InitGate::new(Arc::new(gateway.client()));

    let err = gate.ensure_initialized().await.unwrap_err();

    assert_eq!(err, InitError::Rejected("session rejected".to_string()));
    assert!(!gate.is_initialized());

    gateway.set_init_failing(false);
    gate.ensure_initialized().await.expect("Retry failed");
    assert_eq!(gateway.init_calls(), 2);
}

#[tokio::test]
async fn test_channels_mounted_together_share_init() {
    let gateway = MockGateway::start().await.expect("Failed to start gateway");
    let state = DashboardState::from_config(gateway.config(), gateway.client());

    let chain = state
        .registry
        .connect("NIFTY-chain", ChannelEndpoint::option_chain("NIFTY", None))
        .expect("Failed to connect chain");
    let tick = state
        .registry
        .connect("NIFTY-tick", ChannelEndpoint::market_tick("NIFTY"))
        .expect("Failed to connect tick");

    assert!(chain.wait_for(ConnectionState::Connected).await);
    assert!(tick.wait_for(ConnectionState::Connected).await);
    assert_eq!(gateway.init_calls(), 1);
    assert!(eventually(|| gateway.open_sockets() == 2).await);

    state.registry.disconnect_all().await;
}
