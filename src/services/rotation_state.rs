//! Shared rotation state
//!
//! The index of the currently preferred credential lives in a key/value store
//! shared by every process running the client. Access is best-effort: reads
//! that fail look like "nothing stored", writes are fire-and-forget, and
//! nothing is ever locked. A stale or lost value costs one extra failed
//! attempt on the next call; the TTL resets everyone to index 0 eventually.

use crate::error::StoreError;
use crate::utils::{spawn_observed, with_timeout, TimeoutError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Well-known key holding the preferred credential index
pub const DEFAULT_STATE_KEY: &str = "gemini:current_key_index";

/// Default bound on a single store round trip
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Backend Trait
// ============================================================================

/// Minimal key/value contract the rotation state needs
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Value under `key`, or `None` if absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, expiring after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

// ============================================================================
// Redis Backend
// ============================================================================

/// Redis-compatible backend
///
/// Connects lazily on first use, so an unreachable Redis never prevents the
/// client from starting.
pub struct RedisStateBackend {
    client: Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisStateBackend {
    /// Validate `url` without connecting
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(url)?,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                tracing::info!("Connecting to rotation state store");
                ConnectionManager::new(self.client.clone()).await
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl StateBackend for RedisStateBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }
}

// ============================================================================
// In-Memory Backend
// ============================================================================

/// Process-local backend with per-entry expiry
///
/// Clones share the same map, which lets several executors in one process
/// (or one test) act as peers. Expiry follows the Tokio clock.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateBackend {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        let (value, expires_at) = entries.get(key)?.clone();
        if Instant::now() < expires_at {
            Some(value)
        } else {
            entries.remove(key);
            None
        }
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lookup(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::InvalidValue("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

// ============================================================================
// Rotation State Store
// ============================================================================

/// Best-effort view of the shared preferred-credential index
#[derive(Clone)]
pub struct RotationStateStore {
    backend: Arc<dyn StateBackend>,
    key: String,
    io_timeout: Option<Duration>,
}

impl RotationStateStore {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self {
            backend,
            key: DEFAULT_STATE_KEY.to_string(),
            io_timeout: Some(DEFAULT_IO_TIMEOUT),
        }
    }

    /// Store kept in this process only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStateBackend::new()))
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Bound each store round trip; `None` waits forever
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last persisted index, or `None` if absent, expired, unparsable, or the
    /// store is unreachable. Never fails.
    pub async fn read(&self) -> Option<usize> {
        let raw = match with_timeout(self.io_timeout, self.backend.get(&self.key)).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(
                    key = %self.key,
                    error = %flatten(e),
                    "Failed to read rotation state, using default"
                );
                return None;
            }
        };

        match raw.trim().parse::<usize>() {
            Ok(index) => Some(index),
            Err(_) => {
                tracing::warn!(
                    key = %self.key,
                    error = %StoreError::InvalidValue(raw),
                    "Discarding unparsable rotation state"
                );
                None
            }
        }
    }

    /// Persist `index` and wait for the outcome
    pub async fn try_write(&self, index: usize, ttl: Duration) -> Result<(), StoreError> {
        with_timeout(
            self.io_timeout,
            self.backend.set(&self.key, &index.to_string(), ttl),
        )
        .await
        .map_err(flatten)?;

        tracing::debug!(key = %self.key, index, ttl_secs = ttl.as_secs(), "Persisted rotation state");
        Ok(())
    }

    /// Persist `index` in the background. Failures are logged only.
    pub fn write(&self, index: usize, ttl: Duration) -> Option<JoinHandle<()>> {
        let store = self.clone();
        spawn_observed("persist_rotation_state", async move {
            store.try_write(index, ttl).await
        })
    }
}

fn flatten(err: TimeoutError<StoreError>) -> StoreError {
    match err {
        TimeoutError::Timeout(limit) => StoreError::Timeout(limit),
        TimeoutError::Inner(e) => e,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that fails every call, like an unreachable Redis
    struct DownBackend;

    #[async_trait]
    impl StateBackend for DownBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::InvalidValue("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::InvalidValue("connection refused".to_string()))
        }
    }

    /// Backend that never answers
    struct HungBackend;

    #[async_trait]
    impl StateBackend for HungBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            std::future::pending().await
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_read_empty_store() {
        let store = RotationStateStore::in_memory();
        assert_eq!(store.read().await, None);
    }

    #[tokio::test]
    async fn test_write_then_read_across_instances() {
        let backend = Arc::new(MemoryStateBackend::new());
        let writer = RotationStateStore::new(backend.clone());
        let reader = RotationStateStore::new(backend);

        writer.try_write(2, TTL).await.unwrap();
        assert_eq!(reader.read().await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_expires_after_ttl() {
        let store = RotationStateStore::in_memory();
        store.try_write(1, TTL).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.read().await, Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.read().await, None);
    }

    #[tokio::test]
    async fn test_background_write_lands() {
        let store = RotationStateStore::in_memory();
        let handle = store.write(4, TTL).expect("runtime is available");
        handle.await.unwrap();
        assert_eq!(store.read().await, Some(4));
    }

    #[tokio::test]
    async fn test_unparsable_value_is_discarded() {
        let backend = Arc::new(MemoryStateBackend::new());
        backend.set(DEFAULT_STATE_KEY, "not-a-number", TTL).await.unwrap();

        let store = RotationStateStore::new(backend);
        assert_eq!(store.read().await, None);
    }

    #[tokio::test]
    async fn test_unreachable_store_reads_none() {
        let store = RotationStateStore::new(Arc::new(DownBackend));
        assert_eq!(store.read().await, None);
        assert!(store.try_write(1, TTL).await.is_err());

        let handle = store.write(1, TTL).expect("runtime is available");
        assert!(handle.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_store_times_out() {
        let store = RotationStateStore::new(Arc::new(HungBackend))
            .with_io_timeout(Some(Duration::from_millis(50)));

        assert_eq!(store.read().await, None);
        assert!(matches!(
            store.try_write(1, TTL).await,
            Err(StoreError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_key() {
        let backend = Arc::new(MemoryStateBackend::new());
        let store = RotationStateStore::new(backend.clone()).with_key("tenant-a:index");
        store.try_write(3, TTL).await.unwrap();

        assert_eq!(store.key(), "tenant-a:index");
        assert_eq!(backend.get("tenant-a:index").await.unwrap().as_deref(), Some("3"));
        assert_eq!(backend.get(DEFAULT_STATE_KEY).await.unwrap(), None);
    }

    #[test]
    fn test_redis_open_rejects_bad_url() {
        assert!(RedisStateBackend::open("not a url").is_err());
        assert!(RedisStateBackend::open("redis://127.0.0.1:6379/0").is_ok());
    }
}
