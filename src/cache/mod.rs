// Cache module with fallback when Redis is not available

use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::CacheConfig;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
    #[error("Invalid TTL")]
    InvalidTTL,
}

/// Key/value store with per-entry expiry used for prediction batches.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    /// Round-trip to the backing store; used by the health probe.
    async fn ping(&self) -> Result<(), CacheError>;
    fn backend_name(&self) -> &'static str;
}

fn check_ttl(ttl: Option<Duration>) -> Result<(), CacheError> {
    match ttl {
        Some(ttl) if ttl.as_secs() == 0 => Err(CacheError::InvalidTTL),
        _ => Ok(()),
    }
}

// In-memory cache implementation as fallback
#[derive(Debug, Clone)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Instant::now() >= expires_at)
            .unwrap_or(false)
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::OperationFailed("cache lock poisoned".to_string())
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of live entries, expired ones excluded.
    pub fn len(&self) -> usize {
        self.store
            .read()
            .map(|store| store.values().filter(|e| !e.is_expired()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_entry(&self, key: &str) -> Result<Option<String>, CacheError> {
        {
            let store = self.store.read().map_err(poisoned)?;
            match store.get(key) {
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.store.write().map_err(poisoned)?.remove(key);
        Ok(None)
    }

    fn set_entry(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        check_ttl(ttl)?;
        let mut store = self.store.write().map_err(poisoned)?;
        store.retain(|_, entry| !entry.is_expired());
        store.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.get_entry(key)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.set_entry(key, value, ttl)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.write().map_err(poisoned)?.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let store = self.store.read().map_err(poisoned)?;
        Ok(store.get(key).map(|e| !e.is_expired()).unwrap_or(false))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.store.read().map_err(poisoned).map(|_| ())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Redis-backed cache. Opens a fresh async connection per call.
#[derive(Clone)]
pub struct RedisCache {
    client: Arc<redis::Client>,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub fn from_client(client: Arc<redis::Client>) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<redis::aio::Connection, CacheError> {
        Ok(self.client.get_async_connection().await?)
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        check_ttl(ttl)?;
        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => {
                let seconds = usize::try_from(ttl.as_secs()).map_err(|_| CacheError::InvalidTTL)?;
                let _: () = conn.set_ex(key, value, seconds).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(CacheError::OperationFailed(format!(
                "unexpected PING reply: {reply}"
            )))
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

// Cache factory
pub struct CacheFactory;

impl CacheFactory {
    /// Build the configured backend. An unparsable Redis URL falls back to the
    /// in-memory store; connectivity itself is reported by the health probe.
    pub fn create_cache(config: &CacheConfig, redis_url: &str) -> Arc<dyn CacheBackend> {
        match config.backend.as_str() {
            "redis" => match RedisCache::new(redis_url) {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    tracing::warn!(error = %e, "invalid Redis URL, falling back to in-memory cache");
                    Arc::new(InMemoryCache::new())
                }
            },
            _ => Arc::new(InMemoryCache::new()),
        }
    }
}
