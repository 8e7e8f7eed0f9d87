//! Integration tests for the option chain dashboard streaming core.
//!
//! [`MockGateway`] serves the broker gateway surface in-process on an
//! ephemeral port: `/health`, `/api/ws/init` and the two push routes. Tests
//! drive the sockets it holds through broadcast commands.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use gateway_client::GatewayClient;
use option_chain_dashboard::config::Config;
use parking_lot::Mutex;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Instruction to every open mock socket.
#[derive(Debug, Clone)]
pub enum Command {
    /// Send a text frame.
    Frame(String),
    /// Drop the connection without a close frame.
    Drop,
    /// Send a close frame with this code.
    Close(u16),
}

#[derive(Clone)]
struct GatewayState {
    init_calls: Arc<AtomicUsize>,
    fail_init: Arc<AtomicBool>,
    healthy: Arc<AtomicBool>,
    commands: broadcast::Sender<Command>,
    open_sockets: Arc<AtomicUsize>,
    opened_total: Arc<watch::Sender<usize>>,
    requested: Arc<Mutex<Vec<String>>>,
}

/// In-process broker gateway.
pub struct MockGateway {
    addr: SocketAddr,
    state: GatewayState,
    server: JoinHandle<()>,
}

impl MockGateway {
    /// Binds an ephemeral port and starts serving.
    ///
    /// # Errors
    /// Returns error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (commands, _) = broadcast::channel(1024);
        let (opened_total, _) = watch::channel(0);

        let state = GatewayState {
            init_calls: Arc::new(AtomicUsize::new(0)),
            fail_init: Arc::new(AtomicBool::new(false)),
            healthy: Arc::new(AtomicBool::new(true)),
            commands,
            open_sockets: Arc::new(AtomicUsize::new(0)),
            opened_total: Arc::new(opened_total),
            requested: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/health", get(health))
            .route("/api/ws/init", get(init))
            .route("/ws/option-chain/{symbol}", get(ws_upgrade))
            .route("/ws/market/{symbol}", get(ws_upgrade))
            .layer(TraceLayer::new_for_http())
            .with_state(state.clone());

        let server = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                debug!("Mock gateway stopped: {}", err);
            }
        });

        Ok(Self {
            addr,
            state,
            server,
        })
    }

    /// REST base URL.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// REST client pointed at this gateway.
    ///
    /// # Panics
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn client(&self) -> GatewayClient {
        GatewayClient::with_base_url(&self.base_url()).expect("mock client")
    }

    /// Configuration with short timings for tests.
    #[must_use]
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.gateway.base_url = self.base_url();
        config.stream.backoff_base_ms = 50;
        config.stream.backoff_cap_ms = 200;
        config.stream.max_attempts = 5;
        config.stream.connect_timeout_ms = 2000;
        config.projection.throttle_ms = 20;
        config.health.enabled = false;
        config.health.interval_ms = 50;
        config
    }

    /// Init requests received.
    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.state.init_calls.load(Ordering::SeqCst)
    }

    /// Makes init answer `status: "error"`.
    pub fn set_init_failing(&self, failing: bool) {
        self.state.fail_init.store(failing, Ordering::SeqCst);
    }

    /// Makes `/health` answer 200 or 503.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Sends a text frame on every open socket.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.state.commands.send(Command::Frame(frame.into()));
    }

    /// Drops every open socket without a close frame.
    pub fn drop_sockets(&self) {
        let _ = self.state.commands.send(Command::Drop);
    }

    /// Closes every open socket with `code`.
    pub fn close_sockets(&self, code: u16) {
        let _ = self.state.commands.send(Command::Close(code));
    }

    /// Sockets currently open.
    #[must_use]
    pub fn open_sockets(&self) -> usize {
        self.state.open_sockets.load(Ordering::SeqCst)
    }

    /// Sockets accepted so far.
    #[must_use]
    pub fn opened_total(&self) -> usize {
        *self.state.opened_total.borrow()
    }

    /// Waits until at least `count` sockets were accepted in total.
    pub async fn wait_for_sockets(&self, count: usize) -> bool {
        let mut rx = self.state.opened_total.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|n| *n >= count))
            .await
            .is_ok_and(|result| result.is_ok())
    }

    /// Push routes requested, with query strings.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        self.state.requested.lock().clone()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Polls `condition` every 10 ms for up to five seconds.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn health(State(state): State<GatewayState>) -> impl IntoResponse {
    if state.healthy.load(Ordering::SeqCst) {
        (
            StatusCode::OK,
            Json(json!({"status": "ok", "version": "mock"})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "restarting"})),
        )
    }
}

async fn init(State(state): State<GatewayState>) -> impl IntoResponse {
    state.init_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_init.load(Ordering::SeqCst) {
        Json(json!({"status": "error", "message": "session rejected"}))
    } else {
        Json(json!({"status": "success", "message": "stream session started"}))
    }
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    OriginalUri(uri): OriginalUri,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    state.requested.lock().push(uri.to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let mut commands = state.commands.subscribe();
    state.open_sockets.fetch_add(1, Ordering::SeqCst);
    state.opened_total.send_modify(|n| *n += 1);

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(Command::Frame(text)) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(Command::Drop) => break,
                Ok(Command::Close(code)) => {
                    let frame = CloseFrame { code, reason: "".into() };
                    let _ = sender.send(Message::Close(Some(frame))).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.open_sockets.fetch_sub(1, Ordering::SeqCst);
}
