//! # bsm-alert
//!
//! Price alerts driven by the trade stream multiplexer.
//!
//! [`AlertEvaluator`] consumes any [`bsm_md::TradeSource`]: one task per
//! alerted symbol, a warning through the injected logger whenever a trade
//! prints strictly above an alert's limit.

pub mod evaluator;

pub use evaluator::{AlertEvaluator, evaluate, group_by_symbol, parse_price};
