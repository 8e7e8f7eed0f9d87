//! Unit tests for init gate module.

use super::*;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

/// Initializer that counts calls and replays scripted outcomes after a delay.
struct ScriptedInitializer {
    calls: AtomicUsize,
    outcomes: Mutex<VecDeque<Result<(), InitError>>>,
    latency: Duration,
}

impl ScriptedInitializer {
    fn new(outcomes: Vec<Result<(), InitError>>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcomes: Mutex::new(outcomes.into()),
            latency,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionInitializer for ScriptedInitializer {
    fn initialize(&self) -> BoxFuture<'static, Result<(), InitError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcomes.lock().pop_front().unwrap_or(Ok(()));
        let latency = self.latency;
        async move {
            tokio::time::sleep(latency).await;
            outcome
        }
        .boxed()
    }
}

fn gate_with(initializer: &Arc<ScriptedInitializer>) -> InitGate {
    InitGate::new(Arc::clone(initializer) as Arc<dyn SessionInitializer>)
}

// ============================================================================
// Single-flight Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_request() {
    let initializer = ScriptedInitializer::new(vec![Ok(())], Duration::from_millis(250));
    let gate = gate_with(&initializer);

    let results = join_all((0..10).map(|_| gate.ensure_initialized())).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(initializer.calls(), 1);
    assert_eq!(gate.requests_issued(), 1);
    assert!(gate.is_initialized());
    assert!(!gate.is_initializing());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_across_tasks_share_one_request() {
    let initializer = ScriptedInitializer::new(vec![Ok(())], Duration::from_millis(100));
    let gate = Arc::new(gate_with(&initializer));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.ensure_initialized().await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(initializer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_initialized_gate_skips_network() {
    let initializer = ScriptedInitializer::new(vec![Ok(())], Duration::from_millis(10));
    let gate = gate_with(&initializer);

    gate.ensure_initialized().await.unwrap();
    gate.ensure_initialized().await.unwrap();
    gate.ensure_initialized().await.unwrap();

    assert_eq!(initializer.calls(), 1);
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failure_is_shared_and_leaves_token_unset() {
    let rejection = InitError::Rejected("login required".to_string());
    let initializer =
        ScriptedInitializer::new(vec![Err(rejection.clone())], Duration::from_millis(50));
    let gate = gate_with(&initializer);

    let results = join_all((0..4).map(|_| gate.ensure_initialized())).await;

    assert_eq!(initializer.calls(), 1);
    for result in results {
        assert_eq!(result, Err(rejection.clone()));
    }
    assert!(!gate.is_initialized());
    assert!(!gate.is_initializing());
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_failure_issues_new_request() {
    let initializer = ScriptedInitializer::new(
        vec![Err(InitError::Request("timeout".to_string())), Ok(())],
        Duration::from_millis(20),
    );
    let gate = gate_with(&initializer);

    assert!(gate.ensure_initialized().await.is_err());
    assert!(gate.ensure_initialized().await.is_ok());

    assert_eq!(initializer.calls(), 2);
    assert!(gate.is_initialized());
}

// ============================================================================
// Clear Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_clear_forces_reinitialization() {
    let initializer = ScriptedInitializer::new(vec![Ok(()), Ok(())], Duration::from_millis(20));
    let gate = gate_with(&initializer);

    gate.ensure_initialized().await.unwrap();
    gate.clear();
    assert!(!gate.is_initialized());

    gate.ensure_initialized().await.unwrap();
    assert_eq!(initializer.calls(), 2);
    assert!(gate.is_initialized());
}

#[tokio::test(start_paused = true)]
async fn test_clear_during_init_fails_waiters() {
    let initializer = ScriptedInitializer::new(vec![Ok(())], Duration::from_millis(100));
    let gate = Arc::new(gate_with(&initializer));

    let waiter = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move { gate.ensure_initialized().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(gate.is_initializing());

    gate.clear();
    assert_eq!(waiter.await.unwrap(), Err(InitError::Reset));

    assert!(!gate.is_initialized());
}

#[tokio::test(start_paused = true)]
async fn test_every_waiter_sees_reset_and_next_call_reinitializes() {
    let initializer = ScriptedInitializer::new(vec![Ok(()), Ok(())], Duration::from_millis(100));
    let gate = Arc::new(gate_with(&initializer));

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.ensure_initialized().await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(10)).await;
    gate.clear();

    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Err(InitError::Reset));
    }
    assert!(!gate.is_initialized());

    gate.ensure_initialized().await.unwrap();
    assert!(gate.is_initialized());
    assert_eq!(initializer.calls(), 2);
}
