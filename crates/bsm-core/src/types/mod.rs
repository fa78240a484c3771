//! Core data types flowing through the monitor.
//!
//! Trades are produced by the ingestion loop and consumed once per sink;
//! alerts are parsed from the command line or config before anything connects.

pub mod alert;
pub mod symbol;
pub mod trade;

pub use alert::*;
pub use symbol::*;
pub use trade::*;
