//! Classification of inbound push frames.
//!
//! Frames are tagged by a `type` field. One legacy shape carries a bare chain
//! payload (`{"calls": [...], "puts": [...], "spot": ...}`) with no tag; it is
//! recognized structurally after every tagged form has been ruled out.

use crate::error::FrameError;
use crate::models::{OptionChain, StrikeRow};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `{"type": "ping"}` or `{"type": "heartbeat"}`.
    Heartbeat,
    /// `{"type": "market_tick", "data": {"ltp": ...}}`.
    MarketTick(MarketTick),
    /// `{"type": "chain_update", "data": {...}}`.
    ChainUpdate(ChainPayload),
    /// Untagged frame carrying `calls` and `puts`.
    LegacyChain(ChainPayload),
}

/// Payload of a market tick.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketTick {
    /// Last traded price of the underlying.
    pub ltp: f64,
    /// Symbol, when the gateway includes it.
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Full chain snapshot as sent on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChainPayload {
    /// Underlying symbol.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Underlying spot at snapshot time.
    #[serde(default)]
    pub spot: Option<f64>,
    /// Expiry of the chain.
    #[serde(default)]
    pub expiry: Option<String>,
    /// Call rows.
    pub calls: Vec<StrikeRow>,
    /// Put rows.
    pub puts: Vec<StrikeRow>,
}

impl ChainPayload {
    /// Splits into the chain to store and the spot it carried.
    #[must_use]
    pub fn into_parts(self) -> (OptionChain, Option<f64>) {
        let chain = OptionChain {
            symbol: self.symbol,
            expiry: self.expiry,
            calls: self.calls,
            puts: self.puts,
        };
        (chain, self.spot)
    }
}

impl Frame {
    /// Parses and classifies a raw text frame.
    ///
    /// # Errors
    /// Returns a [`FrameError`] describing why the frame cannot be applied.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let Value::Object(mut object) = serde_json::from_str::<Value>(raw)? else {
            return Err(FrameError::NotAnObject);
        };

        let tag = match object.get("type") {
            Some(Value::String(kind)) => Some(kind.clone()),
            Some(_) => {
                return Err(FrameError::Malformed {
                    kind: "tagged",
                    reason: "type tag is not a string".to_string(),
                });
            }
            None => None,
        };

        match tag.as_deref() {
            Some("heartbeat" | "ping") => Ok(Frame::Heartbeat),
            Some("market_tick") => take_data(&mut object, "market_tick").map(Frame::MarketTick),
            Some("chain_update") => take_data(&mut object, "chain_update").map(Frame::ChainUpdate),
            Some(other) => Err(FrameError::UnknownType(other.to_string())),
            None if object.contains_key("calls") && object.contains_key("puts") => {
                decode("legacy chain", Value::Object(object)).map(Frame::LegacyChain)
            }
            None => Err(FrameError::Untagged),
        }
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Frame::Heartbeat => "heartbeat",
            Frame::MarketTick(_) => "market_tick",
            Frame::ChainUpdate(_) => "chain_update",
            Frame::LegacyChain(_) => "legacy_chain",
        }
    }
}

fn take_data<T: DeserializeOwned>(
    object: &mut Map<String, Value>,
    kind: &'static str,
) -> Result<T, FrameError> {
    let data = object.remove("data").ok_or_else(|| FrameError::Malformed {
        kind,
        reason: "missing data field".to_string(),
    })?;
    decode(kind, data)
}

fn decode<T: DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, FrameError> {
    serde_json::from_value(value).map_err(|err| FrameError::Malformed {
        kind,
        reason: err.to_string(),
    })
}
