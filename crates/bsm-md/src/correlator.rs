//! Subscribe request ids and their acknowledgement bookkeeping.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use bsm_core::canonical_symbol;

/// A subscribe command that has been issued but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: u64,
    /// Canonical (lower-case) symbol the request subscribes to.
    pub symbol: String,
}

/// Issues strictly increasing request ids and remembers which symbol each
/// one was for, so acknowledgement frames can be matched back.
///
/// Ids start at 1 and are never reused within the process.
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    last_id: AtomicU64,
    pending: Mutex<AHashMap<u64, String>>,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next request id.
    #[inline]
    pub fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Allocate an id for a subscribe on `symbol` and record it as pending.
    pub fn issue(&self, symbol: &str) -> PendingRequest {
        let id = self.next_id();
        let symbol = canonical_symbol(symbol);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, symbol.clone());
        PendingRequest { id, symbol }
    }

    /// Match an acknowledgement. Returns the symbol the request was for, or
    /// `None` for an id this process never issued (or already matched).
    pub fn acknowledge(&self, id: u64) -> Option<String> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&id)
    }

    /// Number of requests still awaiting acknowledgement.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The most recently issued id (0 if none).
    pub fn last_id(&self) -> u64 {
        self.last_id.load(Ordering::Acquire)
    }
}
