//! Typed error definitions for the stream monitor.
//!
//! [`WatchError`] covers every failure the multiplexer and its consumers can
//! surface. It is `Clone` because a single terminal ingestion failure is
//! handed to every blocked `watch` caller.

use thiserror::Error;

/// Domain-specific errors for the stream monitor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// Dialing the upstream endpoint failed. Fatal, never retried.
    #[error("failed to dial upstream at '{url}': {reason}")]
    Connect { url: String, reason: String },

    /// Writing a subscribe command to the upstream failed.
    #[error("failed to send subscription request: {0}")]
    SubscribeWrite(String),

    /// The upstream connection broke, was closed, or yielded a bad transport frame.
    #[error("failed to read from ws: {0}")]
    TransportRead(String),

    /// A frame was not valid JSON of the expected shape.
    #[error("failed to unmarshal '{raw}': {reason}")]
    Decode { raw: String, reason: String },

    /// A trade's price could not be parsed as a number.
    #[error("failed to parse price '{price}' for '{symbol}'")]
    PriceParse { symbol: String, price: String },

    /// Malformed alert specification or config value.
    #[error("config error: {0}")]
    Config(String),
}

impl WatchError {
    /// Whether this error is scoped to a single symbol's consumer rather than
    /// to the shared upstream connection.
    pub fn is_symbol_local(&self) -> bool {
        matches!(self, WatchError::PriceParse { .. })
    }
}
