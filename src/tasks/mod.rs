//! Background Tasks Module
//!
//! # Tasks
//! - Expiration sweep: removes expired cache entries at a configured interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
