//! Unit tests for store module.

use super::*;
use crate::models::StrikeRow;

fn chain(strikes: &[f64]) -> OptionChain {
    OptionChain {
        symbol: Some("NIFTY".to_string()),
        expiry: None,
        calls: strikes.iter().map(|s| StrikeRow::new(*s)).collect(),
        puts: Vec::new(),
    }
}

fn key(name: &str) -> ChannelKey {
    ChannelKey::new(name)
}

fn owner() -> Uuid {
    Uuid::nil()
}

// ============================================================================
// Data Mutation Tests
// ============================================================================

#[test]
fn test_new_store_is_empty() {
    let store = MarketStore::new();
    let model = store.snapshot();

    assert_eq!(model, ReadModel::default());
    assert_eq!(store.revision(), 0);
}

#[test]
fn test_update_spot_sets_last_update_and_bumps_revision() {
    let store = MarketStore::new();
    store.update_spot(22_512.5);

    let model = store.snapshot();
    assert_eq!(model.spot, Some(22_512.5));
    assert!(model.last_update.is_some());
    assert!(model.last_update_at.is_some());
    assert_eq!(model.revision, 1);
}

#[test]
fn test_replace_chain_replaces_wholesale() {
    let store = MarketStore::new();
    store.replace_chain(chain(&[100.0, 200.0]), None);
    store.replace_chain(chain(&[300.0]), None);

    let model = store.snapshot();
    let strikes: Vec<f64> = model
        .option_chain
        .as_ref()
        .map(|c| c.calls.iter().map(|r| r.strike).collect())
        .unwrap_or_default();
    assert_eq!(strikes, vec![300.0]);
}

#[test]
fn test_replace_chain_keeps_spot_when_payload_has_none() {
    let store = MarketStore::new();
    store.update_spot(101.0);
    store.replace_chain(chain(&[100.0]), None);
    assert_eq!(store.snapshot().spot, Some(101.0));

    store.replace_chain(chain(&[100.0]), Some(102.0));
    assert_eq!(store.snapshot().spot, Some(102.0));
}

#[test]
fn test_data_mutation_clears_error() {
    let store = MarketStore::new();
    store.record_error("socket error");
    assert_eq!(
        store.snapshot().connection_error.as_deref(),
        Some("socket error")
    );

    store.update_spot(1.0);
    assert!(store.snapshot().connection_error.is_none());
}

// ============================================================================
// Heartbeat Tests
// ============================================================================

#[test]
fn test_heartbeat_aggregates_over_channels() {
    let store = MarketStore::new();
    store.set_heartbeat(&key("a"), owner(), true);
    store.set_heartbeat(&key("b"), owner(), true);
    store.set_heartbeat(&key("a"), owner(), false);
    assert!(store.snapshot().heartbeat_alive);

    store.set_heartbeat(&key("b"), owner(), false);
    assert!(!store.snapshot().heartbeat_alive);
}

#[test]
fn test_heartbeat_does_not_touch_last_update() {
    let store = MarketStore::new();
    store.set_heartbeat(&key("a"), owner(), true);

    let model = store.snapshot();
    assert!(model.heartbeat_alive);
    assert!(model.last_update.is_none());
}

// ============================================================================
// Revision Tests
// ============================================================================

#[test]
fn test_noop_mutations_do_not_bump_revision() {
    let store = MarketStore::new();
    store.set_connection_state(&key("a"), owner(), ConnectionState::Connecting);
    store.set_connection_state(&key("a"), owner(), ConnectionState::Connecting);
    store.clear_channel_error(&key("a"), owner());
    store.set_heartbeat(&key("a"), owner(), false);

    assert_eq!(store.revision(), 1);
}

#[tokio::test]
async fn test_subscribe_observes_revision() {
    let store = MarketStore::new();
    let mut rx = store.subscribe();

    store.update_spot(1.0);
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), 1);
}

// ============================================================================
// Reset and Channel Tests
// ============================================================================

#[test]
fn test_reset_keeps_connection_states() {
    let store = MarketStore::new();
    store.set_connection_state(&key("NIFTY-chain"), owner(), ConnectionState::Connected);
    store.replace_chain(chain(&[1.0]), Some(2.0));
    store.set_heartbeat(&key("NIFTY-chain"), owner(), true);
    store.record_error("boom");
    store.record_terminal_error(&key("NIFTY-tick"), owner(), "gave up");

    store.reset();

    let model = store.snapshot();
    assert!(model.spot.is_none());
    assert!(model.option_chain.is_none());
    assert!(!model.heartbeat_alive);
    assert!(model.connection_error.is_none());
    assert!(model.last_update.is_none());
    assert_eq!(
        model.connection_state(&key("NIFTY-chain")),
        ConnectionState::Connected
    );
    assert!(model.revision > 0);
}

#[test]
fn test_forget_channel() {
    let store = MarketStore::new();
    store.set_connection_state(&key("a"), owner(), ConnectionState::Connected);
    store.set_heartbeat(&key("a"), owner(), true);
    store.record_terminal_error(&key("a"), owner(), "gave up");

    store.forget_channel(&key("a"), owner());

    let model = store.snapshot();
    assert!(model.connections.is_empty());
    assert!(!model.heartbeat_alive);
    assert!(model.connection_error.is_none());
    assert_eq!(model.connection_state(&key("a")), ConnectionState::Disconnected);
}

// ============================================================================
// Ownership Tests
// ============================================================================

#[test]
fn test_replaced_owner_cannot_write_channel_state() {
    let store = MarketStore::new();
    let channel = key("NIFTY-chain");
    let old = Uuid::new_v4();
    let new = Uuid::new_v4();

    store.claim_channel(&channel, old);
    store.set_connection_state(&channel, old, ConnectionState::Connected);
    store.set_heartbeat(&channel, old, true);

    store.claim_channel(&channel, new);
    assert!(!store.snapshot().heartbeat_alive);
    store.set_connection_state(&channel, new, ConnectionState::Connected);
    store.set_heartbeat(&channel, new, true);

    store.set_connection_state(&channel, old, ConnectionState::Closing);
    store.set_connection_state(&channel, old, ConnectionState::Disconnected);
    store.set_heartbeat(&channel, old, false);
    store.forget_channel(&channel, old);

    let model = store.snapshot();
    assert_eq!(model.connection_state(&channel), ConnectionState::Connected);
    assert!(model.heartbeat_alive);
}

#[test]
fn test_reclaim_by_same_owner_is_noop() {
    let store = MarketStore::new();
    let channel = key("a");
    let id = Uuid::new_v4();

    store.claim_channel(&channel, id);
    store.set_heartbeat(&channel, id, true);
    let revision = store.revision();
    store.claim_channel(&channel, id);

    assert_eq!(store.revision(), revision);
    assert!(store.snapshot().heartbeat_alive);
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
fn test_terminal_error_survives_other_channels_activity() {
    let store = MarketStore::new();
    let chain = key("NIFTY-chain");
    let tick = key("NIFTY-tick");
    store.record_terminal_error(&chain, owner(), "reconnect attempts exhausted for NIFTY-chain");

    store.update_spot(22_500.0);
    store.set_heartbeat(&tick, owner(), true);
    store.clear_channel_error(&tick, owner());

    assert_eq!(
        store.snapshot().connection_error.as_deref(),
        Some("reconnect attempts exhausted for NIFTY-chain")
    );

    store.clear_channel_error(&chain, owner());
    assert!(store.snapshot().connection_error.is_none());
}

#[test]
fn test_terminal_error_wins_over_transient() {
    let store = MarketStore::new();
    store.record_terminal_error(&key("a"), owner(), "gave up");
    store.record_error("socket error");

    assert_eq!(store.snapshot().connection_error.as_deref(), Some("gave up"));

    store.clear_channel_error(&key("a"), owner());
    assert!(store.snapshot().connection_error.is_none());
}

#[test]
fn test_transient_error_returns_after_terminal_cleared() {
    let store = MarketStore::new();
    store.record_error("socket error");
    store.record_terminal_error(&key("a"), owner(), "gave up");

    store.forget_channel(&key("a"), owner());

    assert_eq!(
        store.snapshot().connection_error.as_deref(),
        Some("socket error")
    );
}

// ============================================================================
// ReadModel Query Tests
// ============================================================================

#[test]
fn test_is_stale() {
    let now = Instant::now();
    let threshold = Duration::from_secs(15);

    let mut model = ReadModel::default();
    assert!(model.is_stale(now, threshold));

    model.last_update_at = Some(now);
    assert!(!model.is_stale(now + Duration::from_secs(14), threshold));
    assert!(model.is_stale(now + threshold, threshold));
}

#[test]
fn test_chain_for_matches_symbol_or_legacy() {
    let mut model = ReadModel {
        option_chain: Some(Arc::new(chain(&[1.0]))),
        ..ReadModel::default()
    };
    assert!(model.chain_for("NIFTY").is_some());
    assert!(model.chain_for("BANKNIFTY").is_none());

    model.option_chain = Some(Arc::new(OptionChain::default()));
    assert!(model.chain_for("BANKNIFTY").is_some());
}

#[test]
fn test_any_connected() {
    let mut model = ReadModel::default();
    assert!(!model.any_connected());

    model
        .connections
        .insert(key("a"), ConnectionState::Connecting);
    assert!(!model.any_connected());

    model.connections.insert(key("b"), ConnectionState::Connected);
    assert!(model.any_connected());
}
