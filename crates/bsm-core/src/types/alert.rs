//! Price alert definitions.
//!
//! Alerts are given as `SYMBOL>LIMIT` strings, e.g. `BTCUSDT>51000`.

use std::str::FromStr;

use crate::error::WatchError;

/// Fire a warning whenever a trade on `symbol` prints above `limit`.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    symbol: String,
    limit: f64,
}

impl Alert {
    pub fn new(symbol: impl Into<String>, limit: f64) -> Self {
        Self { symbol: symbol.into(), limit }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    /// Whether a trade at `price` triggers this alert. Strictly greater.
    #[inline]
    pub fn is_triggered_by(&self, price: f64) -> bool {
        price > self.limit
    }
}

impl FromStr for Alert {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('>').collect();
        let [symbol, limit] = parts.as_slice() else {
            return Err(WatchError::Config("invalid alert format".into()));
        };

        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(WatchError::Config(format!("missing symbol in alert '{s}'")));
        }

        let limit: f64 = limit.trim().parse().map_err(|e| {
            WatchError::Config(format!("failed to parse limit for '{symbol}': {e}"))
        })?;

        Ok(Self::new(symbol, limit))
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}>{}", self.symbol, self.limit)
    }
}

/// Parse a batch of alert strings, stopping at the first malformed one.
pub fn parse_alerts<I, S>(specs: I) -> Result<Vec<Alert>, WatchError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    specs.into_iter().map(|s| s.as_ref().parse()).collect()
}
