//! HTTP client library for the broker gateway.
//!
//! The dashboard's streaming core talks to the gateway over two surfaces: the
//! push WebSockets, handled by the root crate, and a small REST surface covered
//! here. The REST surface establishes the server-side push session and reports
//! backend health.
//!
//! # Example
//!
//! ```no_run
//! use gateway_client::{ClientConfig, GatewayClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gateway_client::Error> {
//!     let client = GatewayClient::new(ClientConfig {
//!         base_url: "http://localhost:8000".into(),
//!         ..Default::default()
//!     })?;
//!
//!     // Establish the push session before opening any socket
//!     client.init_stream_session().await?;
//!
//!     let health = client.health_check().await?;
//!     println!("Status: {}", health.status);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::{ClientConfig, DEFAULT_HEALTH_PATH, DEFAULT_INIT_PATH, GatewayClient};
pub use error::Error;
pub use types::*;
