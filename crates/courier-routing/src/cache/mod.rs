//! Memoized routing decisions.
//!
//! Classification results are cached under a normalized fingerprint of the
//! request text so repeated requests skip scoring.

/// Cache storage implementation
pub mod storage;

pub use storage::{CacheEntry, CacheStats, Fingerprint, RoutingCache};
