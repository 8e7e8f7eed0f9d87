//! WebSocket transport seam.
//!
//! The registry only sees [`Connector`] and [`Socket`]. The production
//! implementation wraps `tokio-tungstenite`; tests substitute scripted sockets.

use crate::error::TransportError;
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

/// Close code sent on deliberate shutdown; never triggers a reconnect.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Event read from an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Text payload.
    Text(String),
    /// Protocol or I/O error; a `Closed` event follows.
    Error(String),
    /// Socket closed with the peer's close code, if one was sent.
    Closed(Option<u16>),
}

/// An open socket.
pub trait Socket: Send {
    /// Next event, or `None` once the socket is finished.
    fn next_event(&mut self) -> BoxFuture<'_, Option<SocketEvent>>;

    /// Sends a close frame with `code`.
    fn close(&mut self, code: u16) -> BoxFuture<'_, ()>;
}

/// Opens sockets.
pub trait Connector: Send + Sync + 'static {
    /// Opens a socket to `url`.
    fn open(&self, url: &Url) -> BoxFuture<'static, Result<Box<dyn Socket>, TransportError>>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl TungsteniteConnector {
    /// Creates a connector with a handshake timeout.
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, url: &Url) -> BoxFuture<'static, Result<Box<dyn Socket>, TransportError>> {
        let url = url.to_string();
        let connect_timeout = self.connect_timeout;
        async move {
            debug!(url = %url, "Opening WebSocket");
            let (stream, _) = tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::Timeout(connect_timeout))?
                .map_err(Box::new)?;
            Ok(Box::new(TungsteniteSocket::new(stream)) as Box<dyn Socket>)
        }
        .boxed()
    }
}

enum Phase {
    Open,
    Failed,
    Done,
}

/// [`Socket`] over a tungstenite stream.
pub struct TungsteniteSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    phase: Phase,
}

impl TungsteniteSocket {
    fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            stream,
            phase: Phase::Open,
        }
    }

    async fn read(&mut self) -> Option<SocketEvent> {
        match self.phase {
            Phase::Done => return None,
            Phase::Failed => {
                self.phase = Phase::Done;
                return Some(SocketEvent::Closed(None));
            }
            Phase::Open => {}
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(SocketEvent::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(SocketEvent::Text(text)),
                    Err(_) => trace!("Skipping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    self.phase = Phase::Done;
                    return Some(SocketEvent::Closed(frame.map(|f| u16::from(f.code))));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    self.phase = Phase::Failed;
                    return Some(SocketEvent::Error(err.to_string()));
                }
                None => {
                    self.phase = Phase::Done;
                    return Some(SocketEvent::Closed(None));
                }
            }
        }
    }
}

impl Socket for TungsteniteSocket {
    fn next_event(&mut self) -> BoxFuture<'_, Option<SocketEvent>> {
        self.read().boxed()
    }

    fn close(&mut self, code: u16) -> BoxFuture<'_, ()> {
        async move {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            };
            if let Err(err) = self.stream.send(Message::Close(Some(frame))).await {
                debug!(error = %err, "Close frame not delivered");
            }
            self.phase = Phase::Done;
        }
        .boxed()
    }
}

impl std::fmt::Debug for TungsteniteSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteSocket").finish_non_exhaustive()
    }
}
