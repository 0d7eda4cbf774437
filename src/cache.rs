//! Cache invalidation port. Coordinators call it after commit and only log
//! its failures.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(error: redis::RedisError) -> Self {
        CacheError::Backend(error.to_string())
    }
}

/// Key of the cached seat map for an event.
pub fn seat_map_key(event_id: Uuid) -> String {
    format!("event:{event_id}:seats")
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync + 'static {
    async fn invalidate(&self, keys: &[String]) -> Result<(), CacheError>;
}

/// Deletes keys from Redis.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;
        Ok(Self { conn_manager })
    }
}

#[async_trait]
impl CacheInvalidator for RedisCache {
    async fn invalidate(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn_manager.clone();
        let removed: i64 = conn.del(keys).await?;
        debug!(keys = ?keys, removed, "Invalidated cache keys");
        Ok(())
    }
}

/// Used when no cache is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl CacheInvalidator for NoopCache {
    async fn invalidate(&self, _keys: &[String]) -> Result<(), CacheError> {
        Ok(())
    }
}
