//! Decoded trade event.

/// A single executed trade, as decoded from the upstream stream.
///
/// The price stays in its textual form until a consumer parses it, so no
/// precision is lost before the consumer decides how to compare. Each sink
/// receives its own clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    /// Exchange symbol as reported upstream (usually upper case).
    pub symbol: String,
    /// Decimal price, string-encoded.
    pub price: String,
    /// Exchange trade id, when present.
    pub trade_id: Option<u64>,
}

impl Trade {
    pub fn new(symbol: impl Into<String>, price: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), price: price.into(), trade_id: None }
    }

    pub fn with_trade_id(mut self, trade_id: u64) -> Self {
        self.trade_id = Some(trade_id);
        self
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.trade_id {
            Some(id) => write!(f, "Trade({} {} id={id})", self.symbol, self.price),
            None => write!(f, "Trade({} {})", self.symbol, self.price),
        }
    }
}
