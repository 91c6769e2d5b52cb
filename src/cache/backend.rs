//! Cache backends
//!
//! The gateway talks to an external TTL key-value service through
//! [`CacheBackend`]. Redis is the production backend; the in-process
//! backends serve single-node deployments, the cache-off mode and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::OnceCell;

use crate::error::CacheError;

/// TTL key-value service used by the gateway
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a value, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store a value with an expiration in seconds
    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError>;

    /// Remove a key (absent keys are not an error)
    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Round-trip health probe
    async fn ping(&self) -> Result<(), CacheError>;

    /// Short backend name for logs and health output
    fn name(&self) -> &'static str;
}

// ============================================================================
// Redis
// ============================================================================

/// Redis backend over an auto-reconnecting connection manager.
///
/// The manager is established on first use, so a cache service that is down
/// at startup is picked up by a later command or probe.
#[derive(Clone)]
pub struct RedisBackend {
    client: redis::Client,
    manager: Arc<OnceCell<ConnectionManager>>,
}

impl RedisBackend {
    /// Open a client without connecting; only URL errors are reported here
    pub fn new(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            manager: Arc::new(OnceCell::new()),
        })
    }

    /// Open a client and establish the managed connection
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let backend = Self::new(url)?;
        backend.connection().await?;
        Ok(backend)
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let manager = self
            .manager
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        Ok(conn.get::<_, Option<String>>(key).await?)
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// ============================================================================
// In-process
// ============================================================================

/// In-process TTL map
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    /// Check if there are no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a live entry exists for the key
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .map(|(_, expires)| *expires > Instant::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let expires = Instant::now() + Duration::from_secs(ttl_secs);
        self.entries.lock().insert(key.to_string(), (value, expires));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Backend that never stores anything (cache off)
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledBackend;

#[async_trait]
impl CacheBackend for DisabledBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set_ex(&self, _key: &str, _value: String, _ttl_secs: u64) -> Result<(), CacheError> {
        Ok(())
    }

    async fn del(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        assert!(backend.get("k").await.unwrap().is_none());

        backend.set_ex("k", "v".to_string(), 60).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(backend.len(), 1);

        backend.del("k").await.unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_memory_backend_expiry() {
        let backend = MemoryBackend::new();
        backend.set_ex("k", "v".to_string(), 0).await.unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
        assert!(!backend.contains("k"));
    }

    #[tokio::test]
    async fn test_disabled_backend_never_hits() {
        let backend = DisabledBackend;
        backend.set_ex("k", "v".to_string(), 60).await.unwrap();
        assert!(backend.get("k").await.unwrap().is_none());
    }
}
