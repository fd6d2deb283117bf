//! Cache capability used for per-organisation configuration lookups.
//!
//! The cache is optional. Callers treat any error as a miss and fall back to
//! static configuration, and everything must work with [`NullCache`].

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::debug;

use scanproof_common::{ScanError, ScanResult};

/// Key/value cache with optional expiry
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> ScanResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> ScanResult<()>;

    async fn delete(&self, key: &str) -> ScanResult<()>;
}

/// Redis-backed cache (auto-reconnecting connection manager)
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a connection manager for `url`
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = redis::Client::open(url).context("Failed to create Redis client")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self::new(conn))
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> ScanResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await.map_err(cache_error)?;

        debug!(key = %key, hit = value.is_some(), "Cache lookup");
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> ScanResult<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn
                    .set_ex(key, value, ttl.as_secs().max(1))
                    .await
                    .map_err(cache_error)?;
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(cache_error)?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> ScanResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await.map_err(cache_error)?;
        Ok(())
    }
}

/// Cache that stores nothing; every lookup is a miss
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

#[async_trait]
impl CacheStore for NullCache {
    async fn get(&self, _key: &str) -> ScanResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> ScanResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> ScanResult<()> {
        Ok(())
    }
}

fn cache_error(err: redis::RedisError) -> ScanError {
    ScanError::Cache(err.to_string())
}
