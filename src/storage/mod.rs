//! Storage is organized through [cache::CachedStore].
//! The basic idea is:
//!  - A [backend::KeyValueBackend] persists opaque strings under string keys.
//!  - Reads go through an in-memory cache, so after the first read a key is answered without
//!    touching the backend.
//!  - Writes land in the cache immediately and are coalesced into one backend multi-write once
//!    the store has been quiet for the debounce delay.

pub mod backend;
pub mod cache;
pub mod debounce;
pub mod list;
pub mod retry;

use std::time::Duration;

use retry::RetryPolicy;

/// Keys of the record groups tracklog persists.
pub mod keys {
    pub const RUNNING_SESSIONS: &str = "@tracklog/running_sessions";
    pub const WATER_INTAKE: &str = "@tracklog/water_intake";
    pub const TODOS: &str = "@tracklog/todos";
    pub const SETTINGS: &str = "@tracklog/settings";
}

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Quiet period after the last write before pending writes are flushed.
    pub debounce: Duration,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            retry: RetryPolicy::default(),
        }
    }
}
