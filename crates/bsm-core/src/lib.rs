//! # bsm-core
//!
//! Core crate for the stream monitor, providing:
//!
//! - **Types** (`types`) — trades, alerts, symbol canonicalisation
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — the `WatchError` taxonomy via thiserror
//! - **WebSocket** (`ws`) — upstream dial helper
//! - **Logging** (`logging`) — tracing setup and the injectable `Logger`

pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use error::WatchError;
pub use logging::Logger;
pub use types::*;
