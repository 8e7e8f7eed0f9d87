//! Error types for the gateway client.

use thiserror::Error;

#[cfg(test)]
mod tests;

/// Client error types.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The gateway answered the init call with `status: "error"`.
    #[error("Stream session init rejected: {0}")]
    InitRejected(String),
}
