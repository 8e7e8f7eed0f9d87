//! Domain types shared by the registry, dispatcher and read-model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;


/// Kind of push channel served by the broker gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Underlying last-traded-price ticks.
    MarketTick,
    /// Full option chain snapshots.
    OptionChain,
}

impl ChannelKind {
    /// Suffix used when deriving a channel key from an endpoint.
    #[must_use]
    pub fn key_suffix(&self) -> &'static str {
        match self {
            Self::MarketTick => "tick",
            Self::OptionChain => "chain",
        }
    }

    /// Path segment of the push route.
    #[must_use]
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::MarketTick => "market",
            Self::OptionChain => "option-chain",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarketTick => write!(f, "market_tick"),
            Self::OptionChain => write!(f, "option_chain"),
        }
    }
}

/// Identity of a logical channel; at most one connection exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    /// Creates a channel key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ChannelKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Where a channel connects: kind, underlying symbol and optional expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEndpoint {
    /// Channel kind.
    pub kind: ChannelKind,
    /// Underlying symbol (e.g., "NIFTY").
    pub symbol: String,
    /// Expiry date for option chain channels (e.g., "2026-03-05").
    #[serde(default)]
    pub expiry: Option<String>,
}

impl ChannelEndpoint {
    /// Market tick endpoint for a symbol.
    #[must_use]
    pub fn market_tick(symbol: impl Into<String>) -> Self {
        Self {
            kind: ChannelKind::MarketTick,
            symbol: symbol.into(),
            expiry: None,
        }
    }

    /// Option chain endpoint for a symbol and optional expiry.
    #[must_use]
    pub fn option_chain(symbol: impl Into<String>, expiry: Option<&str>) -> Self {
        Self {
            kind: ChannelKind::OptionChain,
            symbol: symbol.into(),
            expiry: expiry.map(str::to_string),
        }
    }

    /// Key derived from symbol and kind, e.g. `NIFTY-chain`.
    #[must_use]
    pub fn default_key(&self) -> ChannelKey {
        ChannelKey(format!("{}-{}", self.symbol, self.kind.key_suffix()))
    }

    /// Resolves the push URL against a WebSocket base URL.
    ///
    /// # Errors
    /// Returns error if the base URL is not a valid URL.
    pub fn url(&self, ws_base: &str) -> Result<Url, url::ParseError> {
        let base = ws_base.trim_end_matches('/');
        let mut url = Url::parse(&format!(
            "{}/ws/{}/{}",
            base,
            self.kind.path_segment(),
            self.symbol
        ))?;

        if let Some(expiry) = &self.expiry {
            url.query_pairs_mut().append_pair("expiry", expiry);
        }

        Ok(url)
    }
}

/// Lifecycle state of a channel connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket and no attempt in progress.
    #[default]
    Disconnected,
    /// Waiting on session init or the socket handshake.
    Connecting,
    /// Socket open, frames flowing.
    Connected,
    /// Manual disconnect in progress.
    Closing,
}

impl ConnectionState {
    /// Whether a socket is open or being opened.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// One strike row of an option chain side.
///
/// Only the strike is typed; the remaining columns (open interest, last
/// price, implied volatility, greeks) are kept as sent by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeRow {
    /// Strike price.
    pub strike: f64,
    /// Remaining columns.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StrikeRow {
    /// Creates a row with no extra columns.
    #[must_use]
    pub fn new(strike: f64) -> Self {
        Self {
            strike,
            fields: Map::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Looks up a column.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Option chain snapshot; always replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    /// Underlying symbol, absent on legacy frames.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Expiry, absent on legacy frames.
    #[serde(default)]
    pub expiry: Option<String>,
    /// Call rows in gateway order.
    pub calls: Vec<StrikeRow>,
    /// Put rows in gateway order.
    pub puts: Vec<StrikeRow>,
}

impl OptionChain {
    /// Number of distinct strikes across both sides.
    #[must_use]
    pub fn strike_count(&self) -> usize {
        let mut strikes: Vec<f64> = self
            .calls
            .iter()
            .chain(self.puts.iter())
            .map(|row| row.strike)
            .collect();
        strikes.sort_by(f64::total_cmp);
        strikes.dedup();
        strikes.len()
    }
}
