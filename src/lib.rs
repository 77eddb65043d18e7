//! Shariff Cache - namespaced in-memory cache for share-count lookups
//!
//! Provides a key/value store partitioned into namespaces with TTL
//! expiration, tag-based eviction and a process-memory admission guard.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, SharedCache};
pub use config::{BackendConfig, CacheOptions, Config};
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
