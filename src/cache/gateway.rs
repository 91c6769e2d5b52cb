//! Fail-open cache gateway
//!
//! `get`, `set` and `delete` never return an error to the caller. When the
//! connection flag is down they skip the backend entirely; when a command
//! fails anyway the failure is logged, counted and swallowed.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::backend::CacheBackend;
use super::keys::{KeyBuilder, Operation, TtlTier};
use super::metrics::CacheMetrics;
use super::status::{ConnectionState, ConnectionStatus, LifecycleEvent};
use crate::error::CacheError;

/// Cache front door used by every read and by the invalidation coordinator
#[derive(Clone)]
pub struct CacheGateway {
    backend: Arc<dyn CacheBackend>,
    status: ConnectionStatus,
    keys: KeyBuilder,
    metrics: CacheMetrics,
}

impl CacheGateway {
    /// Create a gateway over a backend with an injected status cell
    pub fn new(backend: Arc<dyn CacheBackend>, status: ConnectionStatus, keys: KeyBuilder) -> Self {
        Self {
            backend,
            status,
            keys,
            metrics: CacheMetrics::default(),
        }
    }

    /// Gateway whose connection is already known to be ready
    pub fn ready(backend: Arc<dyn CacheBackend>, keys: KeyBuilder) -> Self {
        let status = ConnectionStatus::with_state(ConnectionState::Ready);
        Self::new(backend, status, keys)
    }

    /// Key builder shared with the invalidation coordinator
    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    /// Gateway counters
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// Backend name
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Feed a lifecycle event into the status cell
    pub fn record(&self, event: LifecycleEvent) -> ConnectionState {
        self.status.record(event)
    }

    /// Probe the backend and update the status cell from the outcome
    pub async fn probe(&self) -> ConnectionState {
        match self.backend.ping().await {
            Ok(()) => self.status.record(LifecycleEvent::Ready),
            Err(e) => {
                tracing::warn!(error = %e, backend = self.backend.name(), "Cache ping failed");
                self.status.record(LifecycleEvent::Error)
            }
        }
    }

    /// Read and decode a cached value; any failure is a miss
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.status.is_available() {
            self.metrics.skipped.inc();
            return None;
        }

        let raw = match self.backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.metrics.misses.inc();
                tracing::debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                self.on_error("get", key, &e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.metrics.hits.inc();
                tracing::debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                let e = CacheError::Serialization(e.to_string());
                self.on_error("decode", key, &e);
                None
            }
        }
    }

    /// Encode and store a value; failures are swallowed
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: TtlTier) {
        if !self.status.is_available() {
            self.metrics.skipped.inc();
            return;
        }

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                let e = CacheError::Serialization(e.to_string());
                self.on_error("encode", key, &e);
                return;
            }
        };

        if let Err(e) = self.backend.set_ex(key, raw, ttl.seconds()).await {
            self.on_error("set", key, &e);
        }
    }

    /// Delete a key; failures are swallowed
    pub async fn delete(&self, key: &str) {
        if !self.status.is_available() {
            self.metrics.skipped.inc();
            return;
        }

        if let Err(e) = self.backend.del(key).await {
            self.on_error("delete", key, &e);
        }
    }

    /// Build the key for an operation
    pub fn key_for<P: Serialize + ?Sized>(&self, op: Operation, params: &P) -> String {
        self.keys.key(op, params)
    }

    fn on_error(&self, op: &'static str, key: &str, e: &CacheError) {
        self.metrics.errors.inc();
        tracing::warn!(
            error = %e,
            op = op,
            key = %key,
            "Cache operation failed, continuing without cache"
        );
        if matches!(e, CacheError::Connection(_)) {
            self.status.record(LifecycleEvent::Reconnecting);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::backend::MemoryBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend whose every command fails like a dead connection
    #[derive(Default)]
    pub(crate) struct FailingBackend {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Connection("connection refused".into()))
        }

        async fn set_ex(&self, _key: &str, _value: String, _ttl: u64) -> Result<(), CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Connection("connection refused".into()))
        }

        async fn del(&self, _key: &str) -> Result<(), CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Command("READONLY".into()))
        }

        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::Connection("connection refused".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn memory_gateway() -> (Arc<MemoryBackend>, CacheGateway) {
        let backend = Arc::new(MemoryBackend::new());
        let gateway = CacheGateway::ready(backend.clone(), KeyBuilder::new("test"));
        (backend, gateway)
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let (backend, gateway) = memory_gateway();
        let key = gateway.key_for(Operation::TopicLabel, "T1");

        assert_eq!(gateway.get::<Vec<u32>>(&key).await, None);
        gateway.set(&key, &vec![1u32, 2, 3], TtlTier::Long).await;
        assert!(backend.contains(&key));
        assert_eq!(gateway.get::<Vec<u32>>(&key).await, Some(vec![1, 2, 3]));

        gateway.delete(&key).await;
        assert_eq!(gateway.get::<Vec<u32>>(&key).await, None);

        assert_eq!(gateway.metrics().hits.get(), 1);
        assert_eq!(gateway.metrics().misses.get(), 2);
    }

    #[tokio::test]
    async fn test_failures_never_surface() {
        let backend = Arc::new(FailingBackend::default());
        let gateway = CacheGateway::ready(backend.clone(), KeyBuilder::new("test"));

        assert_eq!(gateway.get::<String>("k").await, None);
        // connection failure flips the flag, later calls skip the backend
        assert_eq!(gateway.state(), ConnectionState::Reconnecting);

        gateway.set("k", "v", TtlTier::Short).await;
        gateway.delete("k").await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.metrics().errors.get(), 1);
        assert_eq!(gateway.metrics().skipped.get(), 2);
    }

    #[tokio::test]
    async fn test_command_error_keeps_flag() {
        let backend = Arc::new(FailingBackend::default());
        let gateway = CacheGateway::ready(backend.clone(), KeyBuilder::new("test"));

        gateway.delete("k").await;
        assert_eq!(gateway.state(), ConnectionState::Ready);
        assert_eq!(gateway.metrics().errors.get(), 1);
    }

    #[tokio::test]
    async fn test_skips_backend_while_unavailable() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_ex("k", "\"cached\"".to_string(), 60).await.unwrap();

        let gateway = CacheGateway::new(
            backend.clone(),
            ConnectionStatus::new(),
            KeyBuilder::new("test"),
        );
        assert_eq!(gateway.get::<String>("k").await, None);

        gateway.record(LifecycleEvent::Ready);
        assert_eq!(gateway.get::<String>("k").await.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn test_undecodable_value_is_a_miss() {
        let (backend, gateway) = memory_gateway();
        backend.set_ex("k", "not json".to_string(), 60).await.unwrap();
        assert_eq!(gateway.get::<u32>("k").await, None);
        assert_eq!(gateway.metrics().errors.get(), 1);
    }

    #[tokio::test]
    async fn test_probe_updates_status() {
        let gateway = CacheGateway::new(
            Arc::new(FailingBackend::default()),
            ConnectionStatus::new(),
            KeyBuilder::new("test"),
        );
        assert_eq!(gateway.probe().await, ConnectionState::Errored);

        let (_, gateway) = memory_gateway();
        gateway.record(LifecycleEvent::Error);
        assert_eq!(gateway.probe().await, ConnectionState::Ready);
    }
}
