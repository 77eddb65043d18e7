//! Error types for the cache
//!
//! Provides unified error handling using thiserror. Cache misses are not
//! errors: lookups report them through `Option` or `bool` results.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Write rejected because process memory usage reached the configured limit
    #[error("Memory usage exceeds limit ({limit})")]
    OutOfSpace { limit: i64 },

    /// Empty namespace or prefix, or an otherwise unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Arithmetic requested on a value that is not a number
    #[error("Value stored at '{key}' is not numeric")]
    TypeMismatch { key: String },

    /// Arithmetic result does not fit the stored number type
    #[error("Arithmetic overflow on '{key}'")]
    Overflow { key: String },

    /// Configuration document could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
