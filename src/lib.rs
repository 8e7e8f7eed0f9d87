//! # Option Chain Dashboard - Streaming Core
//!
//! The real-time data layer behind an options-trading dashboard. It keeps one
//! WebSocket per logical channel to a broker gateway, establishes the
//! server-side push session exactly once before any socket opens, classifies
//! inbound frames into a single read-model of market state, reconnects with
//! bounded exponential backoff, and hands UI consumers a throttled projection
//! of that state.
//!
//! ## Key Features
//!
//! - **Single-Flight Session Init**: Concurrent channel mounts share one init
//!   request through the [`init_gate`].
//!
//! - **One Socket per Channel**: The [`registry`] deduplicates connects by
//!   channel key and supervises each socket in its own task.
//!
//! - **Bounded Reconnect**: Exponential [`backoff`] with a ceiling and a retry
//!   cap; a deliberate close (code 1000) never reconnects.
//!
//! - **Tolerant Frame Handling**: Malformed frames are logged and dropped, the
//!   connection stays up.
//!
//! - **Throttled Projection**: Bursts collapse into at most one UI view per
//!   interval, always built from the latest state.
//!
//! - **Restart Recovery**: The [`health`] monitor detects a gateway restart and
//!   the registry re-establishes the session and every channel.
//!
//! ## Architecture
//!
//! ```text
//! GatewayClient ──init──▶ InitGate
//!                            │
//! ConnectionRegistry ──▶ supervisor task (per channel)
//!                            │  Connector / Socket
//!                            ▼
//!                        Dispatcher ──▶ MarketStore ──▶ ThrottledProjection ──▶ UiView
//!                            │
//!                        HeartbeatMonitor
//! ```
//!
//! ## Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backoff`] | Reconnect delay policy |
//! | [`config`] | TOML configuration |
//! | [`dispatcher`] | Applies frames to the read-model |
//! | [`error`] | Error types |
//! | [`frame`] | Inbound frame classification |
//! | [`health`] | Backend health polling and restart detection |
//! | [`heartbeat`] | Per-channel liveness window |
//! | [`init_gate`] | Single-flight push session init |
//! | [`models`] | Channel and market data types |
//! | [`projection`] | Throttled UI views |
//! | [`registry`] | Channel registry and supervisors |
//! | [`state`] | Wiring of the streaming core |
//! | [`store`] | The read-model |
//! | [`transport`] | WebSocket seam |
//!
//! ## Channels
//!
//! | Kind | Route | Default key |
//! |------|-------|-------------|
//! | `option_chain` | `/ws/option-chain/{symbol}?expiry=...` | `{symbol}-chain` |
//! | `market_tick` | `/ws/market/{symbol}` | `{symbol}-tick` |
//!
//! ## Example Usage
//!
//! ```bash
//! # Default configuration, gateway on localhost:8000
//! cargo run
//!
//! # Custom configuration
//! DASHBOARD_CONFIG=dashboard.toml RUST_LOG=debug cargo run
//! ```
//!
//! ## Dependencies
//!
//! - **tokio** (1.49): Async runtime and timers
//! - **tokio-tungstenite** (0.28): WebSocket client
//! - **dashmap** (6.1): Channel registry
//! - **parking_lot** (0.12): Short critical sections
//! - **serde** (1.0) / **toml** (0.9): Frames and configuration
//! - **tracing** (0.1): Structured logging

pub mod backoff;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod health;
pub mod heartbeat;
pub mod init_gate;
pub mod models;
pub mod projection;
pub mod registry;
pub mod state;
pub mod store;
pub mod transport;
