//! # bsm-md
//!
//! The trade stream multiplexer: one upstream WebSocket connection shared by
//! any number of per-symbol consumers.
//!
//! ## Architecture
//!
//! ```text
//! watch(symbol, sink) ──► ConnectionManager (lazy single dial)
//!                     ──► RequestCorrelator (subscribe id)
//!                     ──► SubscriptionRegistry (symbol → sinks)
//! start() ──► IngestionLoop ──decode──► trade ──► every sink for its symbol
//! ```
//!
//! - [`connection`] — lazily-dialed, process-wide connection
//! - [`correlator`] — request ids and acknowledgement matching
//! - [`registry`] — concurrent symbol → sink map
//! - [`protocol`] — subscribe command builder and frame classifier
//! - [`ingestion`] — the reading/fan-out loop
//! - [`watcher`] — [`TradeWatcher`], the public entry point

pub mod connection;
pub mod correlator;
pub mod ingestion;
pub mod protocol;
pub mod registry;
pub mod watcher;

use async_trait::async_trait;
use bsm_core::WatchError;
use tokio_util::sync::CancellationToken;

pub use registry::{TradeSink, TradeStream, trade_channel};
pub use watcher::{TradeWatcher, WatcherState};

/// Anything that can feed a consumer the trades of one symbol.
///
/// Implemented by [`TradeWatcher`]; consumers depend on this trait so they
/// can be driven by a scripted source in tests.
#[async_trait]
pub trait TradeSource: Send + Sync {
    /// Deliver `symbol`'s trades into `sink` until `cancel` fires (`Ok`) or
    /// the source fails for good (`Err`).
    async fn watch(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        sink: TradeSink,
    ) -> Result<(), WatchError>;
}
