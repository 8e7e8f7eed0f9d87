//! HTTP client for the broker gateway.

use crate::error::Error;
use crate::types::*;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;


/// Default path of the stream session init endpoint.
pub const DEFAULT_INIT_PATH: &str = "/api/ws/init";

/// Default path of the health endpoint.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the gateway (e.g., "http://localhost:8000").
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Path of the stream session init endpoint.
    pub init_path: String,
    /// Path of the health endpoint.
    pub health_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(10),
            init_path: DEFAULT_INIT_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }
}

/// HTTP client for the broker gateway REST surface.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    init_path: String,
    health_path: String,
}

impl GatewayClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Url::parse(&config.base_url)?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            init_path: normalize_path(&config.init_path),
            health_path: normalize_path(&config.health_path),
        })
    }

    /// Creates a new client with default paths and timeout.
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be built.
    pub fn with_base_url(base_url: &str) -> Result<Self, Error> {
        Self::new(ClientConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Performs a health check.
    ///
    /// # Errors
    /// Returns error if the request fails or the gateway answers non-2xx.
    pub async fn health_check(&self) -> Result<HealthResponse, Error> {
        let url = format!("{}{}", self.base_url, self.health_path);
        let resp = self.client.get(&url).send().await?;
        self.handle_response(resp).await
    }

    // ========================================================================
    // Stream session
    // ========================================================================

    /// Asks the gateway to establish the server-side push session.
    ///
    /// # Errors
    /// Returns [`Error::InitRejected`] when the gateway answers with
    /// `status: "error"`, or a transport/API error if the call itself fails.
    pub async fn init_stream_session(&self) -> Result<InitResponse, Error> {
        let url = format!("{}{}", self.base_url, self.init_path);
        debug!("Requesting stream session init at {}", url);
        let resp = self.client.get(&url).send().await?;
        let body: InitResponse = self.handle_response(resp).await?;

        if body.is_success() {
            Ok(body)
        } else {
            Err(Error::InitRejected(body.message.unwrap_or_else(|| {
                "gateway reported status error".to_string()
            })))
        }
    }

    // ========================================================================
    // Internal Helpers
    // ========================================================================

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();

        if status.is_success() {
            Ok(resp.json().await?)
        } else if status.as_u16() == 404 {
            let text = resp.text().await.unwrap_or_default();
            Err(Error::NotFound(text))
        } else {
            let text = resp.text().await.unwrap_or_default();
            Err(Error::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
