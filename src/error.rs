//! Error types for the streaming core.
//!
//! Only [`InitError`] and [`StreamError`] reach callers. Transport and frame
//! errors are absorbed at the registry boundary and surface as
//! `connection_error` / [`ConnectionState`](crate::models::ConnectionState)
//! changes in the read-model.

use crate::models::ChannelKey;
use std::time::Duration;


/// Failure of the stream session init call.
///
/// `Clone` because one in-flight request is shared by every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// The request could not be completed.
    #[error("Session init request failed: {0}")]
    Request(String),

    /// The gateway answered but refused to start the session.
    #[error("Session init rejected: {0}")]
    Rejected(String),

    /// The session was cleared while the request was in flight.
    #[error("Session reset while init was in flight")]
    Reset,
}

impl From<gateway_client::Error> for InitError {
    fn from(err: gateway_client::Error) -> Self {
        match err {
            gateway_client::Error::InitRejected(message) => InitError::Rejected(message),
            other => InitError::Request(other.to_string()),
        }
    }
}

/// Socket-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// WebSocket handshake or protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// Endpoint URL could not be built.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Handshake did not complete in time.
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),
}

/// Why an inbound frame was dropped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Payload is not JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is JSON but not an object.
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// Tagged frame with a type this client does not handle.
    #[error("Unknown frame type: {0}")]
    UnknownType(String),

    /// No type tag and no chain payload.
    #[error("Untagged frame without calls/puts")]
    Untagged,

    /// Recognized frame with a bad payload.
    #[error("Malformed {kind} frame: {reason}")]
    Malformed {
        /// Frame kind being decoded.
        kind: &'static str,
        /// Decoder diagnostic.
        reason: String,
    },
}

/// Errors returned by the public streaming API.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Session init failed.
    #[error(transparent)]
    Init(#[from] InitError),

    /// Transport setup failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No channel registered under this key.
    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelKey),
}

impl From<url::ParseError> for StreamError {
    fn from(err: url::ParseError) -> Self {
        StreamError::Transport(TransportError::InvalidUrl(err))
    }
}
