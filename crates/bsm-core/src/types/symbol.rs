//! Symbol canonicalisation.
//!
//! Symbols are case-insensitive. Every registry key and every subscribe
//! parameter uses the lower-case form; the upstream reports symbols in upper
//! case inside trade frames.

/// Canonical (lower-case) registry key for a symbol.
#[inline]
pub fn canonical_symbol(symbol: &str) -> String {
    symbol.to_lowercase()
}

/// Name of the trade stream for `symbol` (e.g. `btcusdt@trade`).
#[inline]
pub fn trade_stream(symbol: &str) -> String {
    format!("{}@trade", canonical_symbol(symbol))
}

/// Case-insensitive symbol comparison.
#[inline]
pub fn same_symbol(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || canonical_symbol(a) == canonical_symbol(b)
}
