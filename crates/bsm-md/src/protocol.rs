//! Upstream wire format.
//!
//! Builds subscribe commands and classifies inbound frames. A frame that is
//! not a JSON object, or whose known fields have the wrong type, is a
//! [`WatchError::Decode`]. A well-formed object that is neither a trade nor
//! an acknowledgement (e.g. an error reply) is [`Frame::Unrecognized`].

use bsm_core::{Trade, WatchError, trade_stream};
use serde::Deserialize;

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `{"s":"BTCUSDT","p":"51050.5",...}`
    Trade(Trade),
    /// `{"id":1,"result":null}`
    Ack { id: u64 },
    /// Anything else that parsed.
    Unrecognized,
}

/// Fields of interest across every frame shape.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "s")]
    symbol: Option<String>,
    #[serde(rename = "p")]
    price: Option<String>,
    #[serde(rename = "t")]
    trade_id: Option<u64>,
    id: Option<u64>,
}

/// Build the subscribe command for one symbol's trade stream.
pub fn build_subscribe(symbol: &str, id: u64) -> String {
    serde_json::json!({
        "method": "SUBSCRIBE",
        "params": [trade_stream(symbol)],
        "id": id
    })
    .to_string()
}

/// Classify one inbound text frame.
pub fn decode_frame(text: &str) -> Result<Frame, WatchError> {
    let decode_err = |reason: String| WatchError::Decode { raw: text.to_string(), reason };

    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| decode_err(e.to_string()))?;
    if !value.is_object() {
        return Err(decode_err("expected a JSON object".into()));
    }
    let has_result = value.get("result").is_some();
    let raw = RawFrame::deserialize(&value).map_err(|e| decode_err(e.to_string()))?;

    Ok(match raw {
        RawFrame { symbol: Some(symbol), price: Some(price), trade_id, .. } => {
            Frame::Trade(Trade { symbol, price, trade_id })
        }
        RawFrame { id: Some(id), .. } if has_result => Frame::Ack { id },
        _ => Frame::Unrecognized,
    })
}
