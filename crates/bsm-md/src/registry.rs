//! Symbol → sink registry shared by `watch` callers and the ingestion loop.
//!
//! Registration takes the write lock for the whole read-modify-write, so the
//! fan-out path (read lock) never sees a half-updated sink list. A sink is
//! removed only once its consumer has dropped the receiving half.

use std::sync::{PoisonError, RwLock};

use ahash::AHashMap;
use bsm_core::{Trade, canonical_symbol};

/// Sending half of a consumer's trade queue.
///
/// Unbounded so the ingestion loop never waits on a slow consumer.
pub type TradeSink = tokio::sync::mpsc::UnboundedSender<Trade>;

/// Receiving half of a consumer's trade queue.
pub type TradeStream = tokio::sync::mpsc::UnboundedReceiver<Trade>;

/// Create a new sink/stream pair.
pub fn trade_channel() -> (TradeSink, TradeStream) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Registered sinks, keyed by canonical symbol.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    sinks: RwLock<AHashMap<String, Vec<TradeSink>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `sink` to the set for `symbol`.
    pub fn register(&self, symbol: &str, sink: TradeSink) {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        sinks.entry(canonical_symbol(symbol)).or_default().push(sink);
    }

    /// Snapshot of the sinks currently registered for `symbol`, in
    /// registration order. Empty if none.
    pub fn sinks_for(&self, symbol: &str) -> Vec<TradeSink> {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        sinks.get(&canonical_symbol(symbol)).cloned().unwrap_or_default()
    }

    /// Remove the sinks for `symbol` whose receiver has been dropped.
    /// Returns how many were removed.
    pub fn prune_closed(&self, symbol: &str) -> usize {
        let key = canonical_symbol(symbol);
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = sinks.get_mut(&key) else {
            return 0;
        };
        let before = list.len();
        list.retain(|sink| !sink.is_closed());
        let removed = before - list.len();
        if list.is_empty() {
            sinks.remove(&key);
        }
        removed
    }

    /// Number of sinks registered for `symbol`.
    pub fn sink_count(&self, symbol: &str) -> usize {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        sinks.get(&canonical_symbol(symbol)).map_or(0, Vec::len)
    }

    /// All symbols with at least one sink, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        let mut symbols: Vec<String> = sinks.keys().cloned().collect();
        symbols.sort_unstable();
        symbols
    }
}
