//! Cache Store Module
//!
//! Main cache engine: entries partitioned by namespace, with TTL expiration,
//! tagging and a memory admission check in front of every write.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::TimeDelta;
use serde_json::{Number, Value};
use tracing::{debug, info, warn};

use crate::cache::{
    CacheEntry, CacheStats, Clock, KeyIter, MemorySource, Metadata, ProcessMemory, SystemClock,
};
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};

type Bucket = HashMap<String, CacheEntry>;

// == CAS Token ==
/// Value observed by [`Cache::get_with_token`], used by [`Cache::check_and_set`].
#[derive(Debug, Clone, PartialEq)]
pub struct CasToken(Value);

impl CasToken {
    pub fn value(&self) -> &Value {
        &self.0
    }
}

// == Cache ==
/// Namespaced in-memory cache.
///
/// Every operation applies to the namespace selected in the options. Lookups
/// (`get`, `has`, `get_metadata`, `keys`) hide expired entries, while the
/// presence checks of `add`, `replace`, `touch`, the arithmetic operations and
/// the tag accessors see any stored entry until it is swept.
#[derive(Debug)]
pub struct Cache {
    /// namespace -> key -> entry
    data: HashMap<String, Bucket>,
    options: CacheOptions,
    stats: CacheStats,
    clock: Arc<dyn Clock>,
    memory: Arc<dyn MemorySource>,
}

impl Cache {
    // == Constructor ==
    /// Creates a cache on the wall clock, guarded by this process's memory usage.
    pub fn new(options: CacheOptions) -> Result<Self> {
        Self::with_sources(options, Arc::new(SystemClock), Arc::new(ProcessMemory::new()))
    }

    /// Creates a cache with explicit time and memory sources.
    pub fn with_sources(
        options: CacheOptions,
        clock: Arc<dyn Clock>,
        memory: Arc<dyn MemorySource>,
    ) -> Result<Self> {
        options.validate()?;
        info!(
            "Initializing cache: namespace={}, ttl={}s, memory_limit={}",
            options.namespace, options.ttl, options.memory_limit
        );

        Ok(Self {
            data: HashMap::new(),
            options,
            stats: CacheStats::new(),
            clock,
            memory,
        })
    }

    // == Options ==
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn namespace(&self) -> &str {
        &self.options.namespace
    }

    /// Switches the namespace subsequent operations apply to.
    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<()> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return Err(CacheError::InvalidArgument(
                "Namespace cannot be empty".to_string(),
            ));
        }
        self.options.namespace = namespace;
        Ok(())
    }

    /// Changes the TTL; applies to existing entries as well.
    pub fn set_ttl(&mut self, ttl: i64) {
        self.options.ttl = ttl;
    }

    /// Changes the memory ceiling checked before each write.
    pub fn set_memory_limit(&mut self, limit: i64) {
        self.options.memory_limit = limit;
    }

    // == Space ==
    /// Configured memory ceiling in bytes; `<= 0` when unlimited.
    pub fn total_space(&self) -> i64 {
        self.options.memory_limit
    }

    /// Bytes left below the memory ceiling, or `None` when unlimited.
    pub fn available_space(&self) -> Option<u64> {
        let limit = u64::try_from(self.options.memory_limit)
            .ok()
            .filter(|limit| *limit > 0)?;
        Some(limit.saturating_sub(self.memory.usage_bytes()))
    }

    fn ensure_space(&mut self) -> Result<()> {
        let limit = self.options.memory_limit;
        if limit <= 0 {
            return Ok(());
        }

        let usage = self.memory.usage_bytes();
        if limit as u64 > usage {
            return Ok(());
        }

        self.stats.record_rejected_write();
        warn!(
            "Write rejected: memory usage {} reached limit {}",
            usage, limit
        );
        Err(CacheError::OutOfSpace { limit })
    }

    // == Internal Lookup ==
    fn ttl_window(&self) -> Option<TimeDelta> {
        if self.options.ttl > 0 {
            TimeDelta::try_seconds(self.options.ttl)
        } else {
            None
        }
    }

    fn bucket(&self) -> Option<&Bucket> {
        self.data.get(&self.options.namespace)
    }

    fn bucket_mut(&mut self) -> Option<&mut Bucket> {
        self.data.get_mut(&self.options.namespace)
    }

    fn bucket_or_insert(&mut self) -> &mut Bucket {
        self.data
            .entry(self.options.namespace.clone())
            .or_default()
    }

    /// Stored entry that has not expired.
    fn live_entry(&self, key: &str) -> Option<&CacheEntry> {
        let now = self.clock.now();
        let ttl = self.ttl_window();
        self.bucket()?
            .get(key)
            .filter(|entry| !entry.is_expired(now, ttl))
    }

    /// Drops entries of the current namespace rejected by `keep`, returning
    /// how many were removed. An emptied namespace is dropped with them.
    fn retain_current<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str, &CacheEntry) -> bool,
    {
        let Some(bucket) = self.data.get_mut(&self.options.namespace) else {
            return 0;
        };

        let before = bucket.len();
        bucket.retain(|key, entry| keep(key.as_str(), &*entry));
        let removed = before - bucket.len();

        if bucket.is_empty() {
            self.data.remove(&self.options.namespace);
        }
        self.stats.record_evictions(removed);
        removed
    }

    // == Get ==
    /// Returns a copy of the live value stored under `key`.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        let value = self.live_entry(key).map(|entry| entry.value.clone());

        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
            debug!("Cache miss: {}/{}", self.options.namespace, key);
        }
        value
    }

    /// Like [`Cache::get`], also returning a token for [`Cache::check_and_set`].
    pub fn get_with_token(&mut self, key: &str) -> Option<(Value, CasToken)> {
        self.get(key).map(|value| (value.clone(), CasToken(value)))
    }

    /// Returns true if a live entry is stored under `key`.
    pub fn has(&self, key: &str) -> bool {
        self.live_entry(key).is_some()
    }

    pub fn get_metadata(&self, key: &str) -> Option<Metadata> {
        self.live_entry(key).map(CacheEntry::metadata)
    }

    // == Set ==
    /// Stores `value` under `key`, replacing any previous entry and its tags.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.ensure_space()?;

        let now = self.clock.now();
        self.bucket_or_insert()
            .insert(key.to_string(), CacheEntry::new(value, now));
        self.stats.record_writes(1);
        Ok(())
    }

    /// Stores `value` only if nothing is stored under `key`.
    ///
    /// An expired entry that has not been swept yet still counts as stored.
    pub fn add(&mut self, key: &str, value: Value) -> Result<bool> {
        self.ensure_space()?;

        let now = self.clock.now();
        let bucket = self.bucket_or_insert();
        if bucket.contains_key(key) {
            return Ok(false);
        }
        bucket.insert(key.to_string(), CacheEntry::new(value, now));
        self.stats.record_writes(1);
        Ok(true)
    }

    /// Stores `value` only if an entry is already stored under `key`.
    pub fn replace(&mut self, key: &str, value: Value) -> Result<bool> {
        self.ensure_space()?;

        let now = self.clock.now();
        let Some(entry) = self.bucket_mut().and_then(|bucket| bucket.get_mut(key)) else {
            return Ok(false);
        };
        *entry = CacheEntry::new(value, now);
        self.stats.record_writes(1);
        Ok(true)
    }

    /// Stores `value` only if the live value still equals `token`.
    pub fn check_and_set(&mut self, token: &CasToken, key: &str, value: Value) -> Result<bool> {
        match self.live_entry(key) {
            Some(entry) if entry.value == token.0 => {}
            _ => return Ok(false),
        }
        self.set(key, value)?;
        Ok(true)
    }

    /// Restarts the TTL window of the entry under `key`.
    pub fn touch(&mut self, key: &str) -> Result<bool> {
        self.ensure_space()?;

        let now = self.clock.now();
        let Some(entry) = self.bucket_mut().and_then(|bucket| bucket.get_mut(key)) else {
            return Ok(false);
        };
        entry.touch(now);
        Ok(true)
    }

    // == Delete ==
    /// Removes the entry under `key`; an emptied namespace is dropped too.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(bucket) = self.data.get_mut(&self.options.namespace) else {
            return false;
        };
        if bucket.remove(key).is_none() {
            return false;
        }
        if bucket.is_empty() {
            self.data.remove(&self.options.namespace);
        }
        true
    }

    // == Arithmetic ==
    /// Adds `delta` to the number under `key`, starting from `delta` if absent.
    pub fn increment(&mut self, key: &str, delta: i64) -> Result<Value> {
        self.apply_delta(key, i128::from(delta))
    }

    /// Subtracts `delta` from the number under `key`, starting from `-delta` if absent.
    pub fn decrement(&mut self, key: &str, delta: i64) -> Result<Value> {
        self.apply_delta(key, -i128::from(delta))
    }

    fn apply_delta(&mut self, key: &str, delta: i128) -> Result<Value> {
        self.ensure_space()?;

        let now = self.clock.now();
        let updated = if let Some(entry) = self.bucket_mut().and_then(|b| b.get_mut(key)) {
            let updated = add_delta(&entry.value, delta, key)?;
            entry.value = updated.clone();
            entry.touch(now);
            updated
        } else {
            // A missing counter starts out as a signed 64-bit value
            let initial = i64::try_from(delta)
                .map(Value::from)
                .map_err(|_| CacheError::Overflow {
                    key: key.to_string(),
                })?;
            self.bucket_or_insert()
                .insert(key.to_string(), CacheEntry::new(initial.clone(), now));
            initial
        };

        self.stats.record_writes(1);
        Ok(updated)
    }

    // == Bulk Operations ==
    /// Returns the live values among `keys`.
    pub fn get_items<I, K>(&mut self, keys: I) -> HashMap<String, Value>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let now = self.clock.now();
        let ttl = self.ttl_window();
        let bucket = self.data.get(&self.options.namespace);

        let mut found = HashMap::new();
        let mut misses = 0;
        for key in keys {
            let key = key.as_ref();
            let live = bucket
                .and_then(|bucket| bucket.get(key))
                .filter(|entry| !entry.is_expired(now, ttl));
            match live {
                Some(entry) => {
                    found.insert(key.to_string(), entry.value.clone());
                }
                None => misses += 1,
            }
        }

        self.stats.record_lookups(found.len(), misses);
        found
    }

    /// Returns the keys among `keys` that have a live entry, in input order.
    pub fn has_items<I, K>(&self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .filter(|key| self.has(key.as_ref()))
            .map(|key| key.as_ref().to_string())
            .collect()
    }

    /// Stores every pair. Returns the keys not stored, which is always empty.
    pub fn set_items<I, K>(&mut self, items: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.ensure_space()?;

        let now = self.clock.now();
        let bucket = self.bucket_or_insert();
        let mut written = 0;
        for (key, value) in items {
            bucket.insert(key.into(), CacheEntry::new(value, now));
            written += 1;
        }

        self.prune_current();
        self.stats.record_writes(written);
        Ok(Vec::new())
    }

    /// Stores the pairs whose key is not stored yet. Returns the other keys.
    pub fn add_items<I, K>(&mut self, items: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.ensure_space()?;

        let now = self.clock.now();
        let bucket = self.bucket_or_insert();
        let mut rejected = Vec::new();
        let mut written = 0;
        for (key, value) in items {
            let key = key.into();
            if bucket.contains_key(&key) {
                rejected.push(key);
            } else {
                bucket.insert(key, CacheEntry::new(value, now));
                written += 1;
            }
        }

        self.prune_current();
        self.stats.record_writes(written);
        Ok(rejected)
    }

    /// Stores the pairs whose key is already stored. Returns the other keys.
    pub fn replace_items<I, K>(&mut self, items: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.ensure_space()?;

        let now = self.clock.now();
        let Some(bucket) = self.data.get_mut(&self.options.namespace) else {
            return Ok(items.into_iter().map(|(key, _)| key.into()).collect());
        };

        let mut rejected = Vec::new();
        let mut written = 0;
        for (key, value) in items {
            let key = key.into();
            match bucket.get_mut(&key) {
                Some(entry) => {
                    *entry = CacheEntry::new(value, now);
                    written += 1;
                }
                None => rejected.push(key),
            }
        }

        self.stats.record_writes(written);
        Ok(rejected)
    }

    fn prune_current(&mut self) {
        if self.bucket().is_some_and(HashMap::is_empty) {
            self.data.remove(&self.options.namespace);
        }
    }

    // == Clear Operations ==
    /// Drops every entry of `namespace`.
    pub fn clear_by_namespace(&mut self, namespace: &str) -> Result<usize> {
        if namespace.is_empty() {
            return Err(CacheError::InvalidArgument(
                "No namespace given".to_string(),
            ));
        }

        let removed = self.data.remove(namespace).map_or(0, |bucket| bucket.len());
        self.stats.record_evictions(removed);
        debug!("Cleared namespace {}: {} entries", namespace, removed);
        Ok(removed)
    }

    /// Drops the entries of the current namespace whose key starts with `prefix`.
    pub fn clear_by_prefix(&mut self, prefix: &str) -> Result<usize> {
        if prefix.is_empty() {
            return Err(CacheError::InvalidArgument("No prefix given".to_string()));
        }

        let removed = self.retain_current(|key, _| !key.starts_with(prefix));
        debug!("Cleared prefix {}: {} entries", prefix, removed);
        Ok(removed)
    }

    /// Drops the expired entries of the current namespace.
    ///
    /// Returns the number of entries removed; always 0 without a TTL.
    pub fn clear_expired(&mut self) -> usize {
        let Some(ttl) = self.ttl_window() else {
            return 0;
        };

        let now = self.clock.now();
        self.retain_current(|_, entry| !entry.is_expired(now, Some(ttl)))
    }

    /// Drops the expired entries of every namespace.
    pub fn clear_all_expired(&mut self) -> usize {
        let Some(ttl) = self.ttl_window() else {
            return 0;
        };

        let now = self.clock.now();
        let mut removed = 0;
        self.data.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|_, entry| !entry.is_expired(now, Some(ttl)));
            removed += before - bucket.len();
            !bucket.is_empty()
        });

        self.stats.record_evictions(removed);
        removed
    }

    /// Drops everything, in every namespace.
    pub fn flush(&mut self) {
        let removed = self.len();
        self.data.clear();
        self.stats.record_evictions(removed);
        info!("Cache flushed: {} entries removed", removed);
    }

    // == Tags ==
    /// Replaces the tags of the entry under `key`; an empty list clears them.
    pub fn set_tags<I, S>(&mut self, key: &str, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Some(entry) = self.bucket_mut().and_then(|bucket| bucket.get_mut(key)) else {
            return false;
        };
        entry.tags = tags.into_iter().map(Into::into).collect();
        true
    }

    pub fn get_tags(&self, key: &str) -> Option<BTreeSet<String>> {
        self.bucket()?.get(key).map(|entry| entry.tags.clone())
    }

    /// Drops tagged entries of the current namespace matching `tags`.
    ///
    /// With `disjunction` an entry matches when it carries any of the tags,
    /// otherwise it must carry all of them. Untagged entries never match.
    pub fn clear_by_tags<S: AsRef<str>>(&mut self, tags: &[S], disjunction: bool) -> usize {
        let requested = tags.len();
        let removed = self.retain_current(|_, entry| {
            if !entry.is_tagged() {
                return true;
            }
            let missing = entry.missing_tags(tags);
            let matches = if disjunction {
                missing < requested
            } else {
                missing == 0
            };
            !matches
        });

        debug!("Cleared by tags: {} entries", removed);
        removed
    }

    // == Iteration ==
    /// Snapshot of the live keys in the current namespace.
    pub fn keys(&self) -> KeyIter {
        let now = self.clock.now();
        let ttl = self.ttl_window();
        let keys = self
            .bucket()
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|(_, entry)| !entry.is_expired(now, ttl))
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default();
        KeyIter::new(keys)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.len());
        stats
    }

    // == Length ==
    /// Returns the number of stored entries across all namespaces, expired
    /// ones included until swept.
    pub fn len(&self) -> usize {
        self.data.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of namespaces holding at least one entry.
    pub fn namespace_count(&self) -> usize {
        self.data.len()
    }
}

/// Adds `delta` to a stored number, keeping integers integral.
fn add_delta(current: &Value, delta: i128, key: &str) -> Result<Value> {
    let overflow = || CacheError::Overflow {
        key: key.to_string(),
    };

    let Value::Number(number) = current else {
        return Err(CacheError::TypeMismatch {
            key: key.to_string(),
        });
    };

    let integer = number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from));
    if let Some(integer) = integer {
        let sum = integer + delta;
        return i64::try_from(sum)
            .map(Value::from)
            .or_else(|_| u64::try_from(sum).map(Value::from))
            .map_err(|_| overflow());
    }

    let float = number.as_f64().ok_or_else(overflow)?;
    Number::from_f64(float + delta as f64)
        .map(Value::Number)
        .ok_or_else(overflow)
}
