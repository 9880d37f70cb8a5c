//! Fuzzy hash storage.
//!
//! The store is an in-memory index of (fuzzy hash, timestamp) records with
//! an on-disk snapshot:
//!
//! ```text
//!                ┌──────────────┐
//!  commands ───► │ Bloom filter │ "definitely absent" short-circuit
//!                └──────┬───────┘
//!                       ▼
//!            ┌─────────────────────┐
//!            │ buckets[1024]       │ insertion-ordered records,
//!            │ block_size % 1024   │ linear similarity scan
//!            └─────────┬───────────┘
//!                      ▼
//!              ┌───────────────┐
//!              │   hash file   │ periodic rewrite with TTL expiry
//!              └───────────────┘
//! ```
//!
//! All mutation funnels through [`HashIndex`]; [`snapshot`] owns the file
//! format and the expiry sweep.

pub mod index;
pub mod record;
pub mod snapshot;

pub use index::{HashIndex, MOD_LIMIT, NUM_BUCKETS};
pub use record::{Record, RECORD_SIZE};

/// Wall-clock seconds since the Unix epoch.
pub(crate) fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
