//! Redis Hash Cache
//!
//! Implements HashCache over Redis hashes (HSET / HGET / HDEL), so every
//! replica of a service shares one cache.

use crate::domain::errors::ServiceError;
use crate::domain::ports::HashCache;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Redis-backed hash cache.
///
/// The connection manager reconnects on its own after a dropped
/// connection; cloning the cache shares it.
#[derive(Clone)]
pub struct RedisHashCache {
    conn: ConnectionManager,
}

impl RedisHashCache {
    /// Connect to the server at `url` (`redis://host:port/db`).
    pub async fn connect(url: &str) -> Result<Self, ServiceError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("redis cache connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl HashCache for RedisHashCache {
    async fn hset(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), ServiceError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, ServiceError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.hget(key, field).await?;
        Ok(value)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, ServiceError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.hdel(key, field).await?;
        Ok(removed > 0)
    }
}
