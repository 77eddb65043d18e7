//! Cache Module
//!
//! Provides a namespaced in-memory cache with TTL expiration, tagging and a
//! memory admission guard.

mod clock;
mod entry;
mod iter;
mod memory;
mod shared;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, Metadata};
pub use iter::KeyIter;
pub use memory::{FixedMemory, MemorySource, ProcessMemory};
pub use shared::SharedCache;
pub use stats::CacheStats;
pub use store::{Cache, CasToken};
