//! # Key-Value Store
//!
//! The local registry, history and remote listing cache all live in a small
//! key-value namespace with string, set and list values. [`KeyValueStore`]
//! abstracts the handful of commands they need so the same engine runs against
//! the in-process [`MemoryStore`] or, with the `redis-store` feature, a shared
//! Redis server.
//!
//! None of the multi-key updates built on top of this trait are transactional.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::IndexResult;

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use self::redis::RedisStore;

/// Remaining lifetime of a key, as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists and never expires.
    Persistent,
    /// The key expires after the given duration.
    Expires(Duration),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    // strings
    async fn get(&self, key: &str) -> IndexResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> IndexResult<()>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> IndexResult<()>;
    async fn ttl(&self, key: &str) -> IndexResult<KeyTtl>;
    async fn exists(&self, key: &str) -> IndexResult<bool>;
    async fn delete(&self, key: &str) -> IndexResult<bool>;

    // sets
    async fn sadd(&self, key: &str, member: &str) -> IndexResult<bool>;
    async fn srem(&self, key: &str, member: &str) -> IndexResult<bool>;
    async fn smembers(&self, key: &str) -> IndexResult<Vec<String>>;
    async fn sismember(&self, key: &str, member: &str) -> IndexResult<bool>;
    async fn scard(&self, key: &str) -> IndexResult<usize>;

    // lists
    async fn lpush(&self, key: &str, value: &str) -> IndexResult<usize>;
    /// Keep only the elements between `start` and `stop`, inclusive.
    async fn ltrim(&self, key: &str, start: usize, stop: usize) -> IndexResult<()>;
    /// Elements between `start` and `stop`, inclusive.
    async fn lrange(&self, key: &str, start: usize, stop: usize) -> IndexResult<Vec<String>>;
    /// Remove every occurrence of `value`, returning how many were removed.
    async fn lrem(&self, key: &str, value: &str) -> IndexResult<usize>;
    async fn llen(&self, key: &str) -> IndexResult<usize>;
}
