//! Configuration Module
//!
//! Typed cache options, the `shariff.json` backend document they are usually
//! derived from, and environment variable overrides.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{CacheError, Result};

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "shariff";

/// TTL in seconds used when the backend document does not set one
pub const DEFAULT_TTL: i64 = 60;

/// Adapter name of the in-memory cache in the `cache.adapter` field
pub const MEMORY_ADAPTER: &str = "memory";

// == Cache Options ==
/// Options of a single cache instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Namespace all operations apply to
    pub namespace: String,
    /// Seconds after the last write an entry expires; `<= 0` never expires
    pub ttl: i64,
    /// Ceiling on process memory usage in bytes; `<= 0` means unlimited
    pub memory_limit: i64,
}

impl CacheOptions {
    /// Checks the options for values no cache can operate with.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(CacheError::InvalidArgument(
                "Namespace cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl: DEFAULT_TTL,
            memory_limit: 0,
        }
    }
}

// == Backend Document ==
/// Number fields in `shariff.json` are written either as JSON numbers or as
/// numeric strings, depending on how the settings form stored them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    fn as_f64(&self) -> Option<f64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// `cache` section of the backend document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendCacheSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<NumberOrString>,
    #[serde(
        default,
        rename = "cacheDir",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_dir: Option<String>,
}

/// `client` section of the backend document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendClientSection {
    /// Timeout of share-count requests, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<NumberOrString>,
}

/// The `shariff.json` document read by the share-count backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub cache: BackendCacheSection,
    #[serde(default)]
    pub client: BackendClientSection,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    /// Per-service sections such as `Facebook`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BackendConfig {
    /// Parses a backend document from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CacheError::Config(format!("Invalid backend document: {}", e)))
    }

    /// Reads and parses the backend document at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            CacheError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Derives cache options from the `cache` section.
    ///
    /// Only the in-memory cache is available. Other adapters the plugin
    /// writes (`filesystem`, `apcu`, `memcached`, ...) fall back to it.
    pub fn cache_options(&self) -> Result<CacheOptions> {
        if let Some(adapter) = &self.cache.adapter {
            if !adapter.eq_ignore_ascii_case(MEMORY_ADAPTER) {
                warn!(
                    "Cache adapter '{}' is not available, using the in-memory cache",
                    adapter
                );
            }
        }

        let ttl = match &self.cache.ttl {
            Some(raw) => raw.as_f64().map(|secs| secs as i64).ok_or_else(|| {
                CacheError::Config(format!("cache.ttl is not a number: {:?}", raw))
            })?,
            None => DEFAULT_TTL,
        };

        let options = CacheOptions {
            ttl,
            ..CacheOptions::default()
        };
        options.validate()?;
        Ok(options)
    }

    /// Share-count request timeout in seconds, if configured.
    pub fn client_timeout(&self) -> Option<f64> {
        self.client.timeout.as_ref().and_then(NumberOrString::as_f64)
    }
}

// == Config ==
/// Complete configuration: cache options plus the sweeper interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub cache: CacheOptions,
    /// Background sweep interval in seconds
    pub sweep_interval: u64,
}

impl Config {
    /// Creates a new Config from defaults and environment variables.
    ///
    /// # Environment Variables
    /// - `SHARIFF_CACHE_NAMESPACE` - Cache namespace (default: shariff)
    /// - `SHARIFF_CACHE_TTL` - TTL in seconds (default: 60)
    /// - `SHARIFF_CACHE_MEMORY_LIMIT` - Memory ceiling in bytes (default: 0, unlimited)
    /// - `SHARIFF_CACHE_SWEEP_INTERVAL` - Sweep frequency in seconds (default: 30)
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Creates a Config from a backend document, then applies environment overrides.
    pub fn from_backend(backend: &BackendConfig) -> Result<Self> {
        let config = Self {
            cache: backend.cache_options()?,
            ..Self::default()
        }
        .with_env_overrides();
        config.cache.validate()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(namespace) = env::var("SHARIFF_CACHE_NAMESPACE") {
            if !namespace.is_empty() {
                self.cache.namespace = namespace;
            }
        }
        if let Some(ttl) = env_parse("SHARIFF_CACHE_TTL") {
            self.cache.ttl = ttl;
        }
        if let Some(limit) = env_parse("SHARIFF_CACHE_MEMORY_LIMIT") {
            self.cache.memory_limit = limit;
        }
        if let Some(interval) = env_parse("SHARIFF_CACHE_SWEEP_INTERVAL") {
            self.sweep_interval = interval;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheOptions::default(),
            sweep_interval: 30,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
