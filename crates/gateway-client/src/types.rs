//! Request and response types for the gateway REST surface.

use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

/// Outcome reported by the stream session init endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitStatus {
    /// The push session is established.
    Success,
    /// The gateway could not establish the session.
    Error,
}

impl std::fmt::Display for InitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version, when the gateway reports one.
    #[serde(default)]
    pub version: Option<String>,
}

impl HealthResponse {
    /// Whether the gateway reports itself healthy.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.status.as_str(), "ok" | "healthy")
    }
}

// ============================================================================
// Stream session
// ============================================================================

/// Response of the stream session init endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResponse {
    /// Init outcome.
    pub status: InitStatus,
    /// Optional human readable detail.
    #[serde(default)]
    pub message: Option<String>,
}

impl InitResponse {
    /// Whether the push session was established.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == InitStatus::Success
    }
}
