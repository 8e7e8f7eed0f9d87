//! Per-channel supervisor task: init, open, read, close and reconnect.

use super::StateReporter;
use crate::backoff::{BackoffPolicy, RetryState};
use crate::dispatcher::Dispatcher;
use crate::init_gate::InitGate;
use crate::models::{ChannelKey, ConnectionState};
use crate::transport::{ABNORMAL_CLOSURE, Connector, NORMAL_CLOSURE, SocketEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use url::Url;

/// How one connection attempt ended.
enum Outcome {
    /// Shutdown was requested; the socket, if any, was closed with 1000.
    Shutdown,
    /// The socket closed or never opened. `None` means no close frame.
    Closed(Option<u16>),
}

enum Step {
    Event(SocketEvent),
    Shutdown,
}

pub(super) struct Supervisor {
    pub(super) channel: ChannelKey,
    pub(super) url: Url,
    pub(super) reporter: StateReporter,
    pub(super) retry_attempts: Arc<AtomicU32>,
    pub(super) init_gate: Arc<InitGate>,
    pub(super) connector: Arc<dyn Connector>,
    pub(super) backoff: BackoffPolicy,
    pub(super) heartbeat_window: Duration,
}

impl Supervisor {
    pub(super) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let dispatcher = Dispatcher::new(
            self.channel.clone(),
            self.reporter.owner,
            Arc::clone(&self.reporter.store),
            self.heartbeat_window,
        );
        let mut retry = RetryState::default();

        loop {
            self.reporter.set(ConnectionState::Connecting);
            let outcome = self.attempt(&dispatcher, &mut retry, &mut shutdown).await;
            dispatcher.on_close();
            self.reporter.set(ConnectionState::Disconnected);

            let code = match outcome {
                Outcome::Shutdown => {
                    info!(channel = %self.channel, "Channel closed on request");
                    break;
                }
                Outcome::Closed(Some(NORMAL_CLOSURE)) => {
                    info!(channel = %self.channel, "Server closed channel normally, not reconnecting");
                    break;
                }
                Outcome::Closed(code) => code.unwrap_or(ABNORMAL_CLOSURE),
            };

            let Some(delay) = self.backoff.next_delay(&mut retry) else {
                let message = format!(
                    "reconnect attempts exhausted for {} after {} retries",
                    self.channel,
                    retry.attempts()
                );
                error!(channel = %self.channel, attempts = retry.attempts(), "Giving up on channel");
                self.reporter
                    .store
                    .record_terminal_error(&self.channel, self.reporter.owner, message);
                return;
            };
            self.retry_attempts.store(retry.attempts(), Ordering::Release);
            warn!(
                channel = %self.channel,
                code,
                attempt = retry.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Connection lost, scheduling reconnect"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut shutdown) => {
                    debug!(channel = %self.channel, "Pending reconnect cancelled");
                    break;
                }
            }
        }

        retry.reset();
        self.retry_attempts.store(0, Ordering::Release);
    }

    async fn attempt(
        &self,
        dispatcher: &Dispatcher,
        retry: &mut RetryState,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Outcome {
        let store = &self.reporter.store;

        let initialized = tokio::select! {
            result = self.init_gate.ensure_initialized() => result,
            _ = shutdown_requested(shutdown) => return Outcome::Shutdown,
        };
        if let Err(err) = initialized {
            store.record_error(err.to_string());
            return Outcome::Closed(None);
        }

        let opened = tokio::select! {
            result = self.connector.open(&self.url) => result,
            _ = shutdown_requested(shutdown) => return Outcome::Shutdown,
        };
        let mut socket = match opened {
            Ok(socket) => socket,
            Err(err) => {
                warn!(channel = %self.channel, url = %self.url, error = %err, "Socket open failed");
                store.record_error(format!("Connection to {} failed: {}", self.channel, err));
                return Outcome::Closed(None);
            }
        };

        self.reporter.set(ConnectionState::Connected);
        retry.reset();
        self.retry_attempts.store(0, Ordering::Release);
        store.clear_channel_error(&self.channel, self.reporter.owner);
        info!(channel = %self.channel, url = %self.url, "Channel connected");

        loop {
            let step = tokio::select! {
                event = socket.next_event() => {
                    Step::Event(event.unwrap_or(SocketEvent::Closed(None)))
                }
                _ = shutdown_requested(shutdown) => Step::Shutdown,
            };

            match step {
                Step::Event(SocketEvent::Text(raw)) => dispatcher.dispatch(&raw),
                Step::Event(SocketEvent::Error(message)) => {
                    warn!(channel = %self.channel, error = %message, "WebSocket error");
                    store.record_error(format!("WebSocket error on {}: {}", self.channel, message));
                }
                Step::Event(SocketEvent::Closed(code)) => {
                    debug!(channel = %self.channel, code = ?code, "Socket closed");
                    if code != Some(NORMAL_CLOSURE) {
                        store.record_error(format!(
                            "Connection to {} lost (code {})",
                            self.channel,
                            code.unwrap_or(ABNORMAL_CLOSURE)
                        ));
                    }
                    return Outcome::Closed(code);
                }
                Step::Shutdown => {
                    self.reporter.set(ConnectionState::Closing);
                    socket.close(NORMAL_CLOSURE).await;
                    return Outcome::Shutdown;
                }
            }
        }
    }
}

/// Resolves once shutdown is signalled or the controlling handle is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
