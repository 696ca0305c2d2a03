//! Redis-backed key-value store

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use super::{KeyTtl, KeyValueStore};
use crate::error::{IndexError, IndexResult};

impl From<redis::RedisError> for IndexError {
    fn from(e: redis::RedisError) -> Self {
        IndexError::Store(e.to_string())
    }
}

fn as_isize(value: usize) -> isize {
    isize::try_from(value).unwrap_or(isize::MAX)
}

/// Key-value store shared through a Redis server.
///
/// The connection manager reconnects transparently; each call works on a
/// cheap clone of it.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to `redis://host:port/db`.
    pub async fn connect(url: &str) -> IndexResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_tokio_connection_manager().await?;
        info!(url = %url, "Connected to Redis");
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> IndexResult<Option<String>> {
        Ok(self.conn().get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> IndexResult<()> {
        self.conn().set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> IndexResult<()> {
        // SETEX rejects a zero expiry
        let seconds = usize::try_from(ttl.as_secs().max(1)).unwrap_or(usize::MAX);
        self.conn().set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> IndexResult<KeyTtl> {
        let ttl: i64 = self.conn().ttl(key).await?;
        Ok(match ttl {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            secs => KeyTtl::Expires(Duration::from_secs(secs.max(0).unsigned_abs())),
        })
    }

    async fn exists(&self, key: &str) -> IndexResult<bool> {
        Ok(self.conn().exists(key).await?)
    }

    async fn delete(&self, key: &str) -> IndexResult<bool> {
        let removed: usize = self.conn().del(key).await?;
        Ok(removed > 0)
    }

    async fn sadd(&self, key: &str, member: &str) -> IndexResult<bool> {
        let added: usize = self.conn().sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> IndexResult<bool> {
        let removed: usize = self.conn().srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> IndexResult<Vec<String>> {
        let mut members: Vec<String> = self.conn().smembers(key).await?;
        members.sort();
        Ok(members)
    }

    async fn sismember(&self, key: &str, member: &str) -> IndexResult<bool> {
        Ok(self.conn().sismember(key, member).await?)
    }

    async fn scard(&self, key: &str) -> IndexResult<usize> {
        Ok(self.conn().scard(key).await?)
    }

    async fn lpush(&self, key: &str, value: &str) -> IndexResult<usize> {
        Ok(self.conn().lpush(key, value).await?)
    }

    async fn ltrim(&self, key: &str, start: usize, stop: usize) -> IndexResult<()> {
        self.conn()
            .ltrim::<_, ()>(key, as_isize(start), as_isize(stop))
            .await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: usize, stop: usize) -> IndexResult<Vec<String>> {
        Ok(self
            .conn()
            .lrange(key, as_isize(start), as_isize(stop))
            .await?)
    }

    async fn lrem(&self, key: &str, value: &str) -> IndexResult<usize> {
        // count 0 removes every occurrence
        Ok(self.conn().lrem(key, 0, value).await?)
    }

    async fn llen(&self, key: &str) -> IndexResult<usize> {
        Ok(self.conn().llen(key).await?)
    }
}
