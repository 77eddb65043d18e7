//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and tag support.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The stored value
    pub value: Value,
    /// Time of the last write or touch
    pub write_time: DateTime<Utc>,
    /// Tags attached through `set_tags`
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an untagged entry written at `now`.
    pub fn new(value: Value, now: DateTime<Utc>) -> Self {
        Self {
            value,
            write_time: now,
            tags: BTreeSet::new(),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry whose age equals the TTL is already
    /// expired. `None` means entries never expire.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Option<TimeDelta>) -> bool {
        match ttl {
            Some(ttl) => now - self.write_time >= ttl,
            None => false,
        }
    }

    /// Restarts the TTL window.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.write_time = now;
    }

    /// Returns true if the entry carries at least one tag.
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }

    /// Counts the query tags the entry does not carry.
    pub fn missing_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        tags.iter()
            .filter(|tag| !self.tags.contains::<str>(tag.as_ref()))
            .count()
    }

    pub fn metadata(&self) -> Metadata {
        Metadata {
            write_time: self.write_time,
        }
    }
}

// == Metadata ==
/// Metadata reported for a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub write_time: DateTime<Utc>,
}
