//! Resilient access to the remote key-value store.
//!
//! [`ResilientStore`] wraps a [`KvBackend`] and applies one of three
//! [`FailurePolicy`] strategies per operation:
//!
//! - `connect` and `get` retry transient failures up to the configured limit,
//!   then raise.
//! - `get_cache` and `set_cache` make one attempt and degrade to "absent"
//!   (or "not written") on failure.
//! - `set` makes one attempt and raises any failure.
//!
//! Retries are immediate: there is no backoff between attempts. Every backend
//! call is bounded by the configured timeout, and an elapsed timeout counts as
//! a transient failure.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Failure reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Connectivity or timeout problem; eligible for retry.
    #[error("store unreachable: {0}")]
    Transient(String),
    /// Logical or permanent problem; never retried.
    #[error("store error: {0}")]
    Permanent(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

/// Failure surfaced by [`ResilientStore`] to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Transient failures persisted through every allowed attempt.
    #[error("store {operation} failed after {attempts} attempt(s): {source}")]
    Unavailable {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: BackendError,
    },
    /// A single-attempt operation failed, or a permanent failure ended a retry loop.
    #[error("store {operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },
}

/// Minimal key-value operations the resilient layer needs from a store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Liveness probe.
    async fn ping(&self) -> Result<(), BackendError>;

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Writes `value` under `key`, replacing any previous value. A `ttl`
    /// makes the entry expire after that duration.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), BackendError>;
}

/// Bounded, immediate retry of transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
}

impl RetryPolicy {
    /// A limit of `n` allows at most `n` attempts in total (never fewer than one).
    pub fn new(limit: u32) -> Self {
        Self {
            attempts: limit.max(1),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Store call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    if attempt >= self.attempts {
                        tracing::error!(operation, attempts = attempt, "Store retries exhausted: {}", err);
                        return Err(StoreError::Unavailable {
                            operation,
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tracing::warn!(operation, attempt, "Store call failed, trying again: {}", err);
                }
                Err(err) => {
                    tracing::error!(operation, attempt, "Store call failed permanently: {}", err);
                    return Err(StoreError::Backend {
                        operation,
                        source: err,
                    });
                }
            }
        }
    }
}

/// How a store operation reacts to backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Retry transient failures, then raise.
    RetryThenRaise(RetryPolicy),
    /// One attempt; any failure is logged and replaced by the default value.
    DegradeToAbsent,
    /// One attempt; any failure is raised.
    SingleAttempt,
}

impl FailurePolicy {
    pub async fn execute<T, F, Fut>(self, operation: &'static str, mut call: F) -> Result<T, StoreError>
    where
        T: Default,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        match self {
            FailurePolicy::RetryThenRaise(retry) => retry.run(operation, call).await,
            FailurePolicy::DegradeToAbsent => match call().await {
                Ok(value) => Ok(value),
                Err(err @ BackendError::Transient(_)) => {
                    tracing::warn!(operation, "Store unreachable, degrading to absent: {}", err);
                    Ok(T::default())
                }
                Err(err) => {
                    tracing::error!(operation, "Unexpected store failure, degrading to absent: {}", err);
                    Ok(T::default())
                }
            },
            FailurePolicy::SingleAttempt => call().await.map_err(|source| {
                tracing::error!(operation, "Store call failed: {}", source);
                StoreError::Backend { operation, source }
            }),
        }
    }
}

/// Connection parameters of a store handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub endpoint: String,
    /// Database index; partitions the key space (1 = production, 2 = tests).
    pub db: i16,
    pub retries: u32,
    pub timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            endpoint: MemoryBackend::ENDPOINT.to_string(),
            db: 1,
            retries: 3,
            timeout: Duration::from_secs(3),
        }
    }
}

/// Store handle shared by all requests for the lifetime of the process.
pub struct ResilientStore {
    backend: Arc<dyn KvBackend>,
    settings: StoreSettings,
    retry: RetryPolicy,
}

impl ResilientStore {
    pub fn new(backend: Arc<dyn KvBackend>, settings: StoreSettings) -> Self {
        let retry = RetryPolicy::new(settings.retries);
        Self {
            backend,
            settings,
            retry,
        }
    }

    /// In-process store, used when no remote endpoint is configured.
    pub fn in_memory(settings: StoreSettings) -> Self {
        Self::new(Arc::new(MemoryBackend::default()), settings)
    }

    /// Probes the backend, retrying transient failures.
    pub async fn connect(&self) -> Result<(), StoreError> {
        FailurePolicy::RetryThenRaise(self.retry)
            .execute("connect", || self.timed(self.backend.ping()))
            .await?;
        tracing::info!(
            endpoint = %self.settings.endpoint,
            db = self.settings.db,
            "Store connection established"
        );
        Ok(())
    }

    /// Reads a key, retrying transient failures and raising once they are exhausted.
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        FailurePolicy::RetryThenRaise(self.retry)
            .execute("get", || self.timed(self.backend.get(key)))
            .await
    }

    /// Degraded read: any failure yields `None` instead of an error.
    pub async fn get_cache(&self, key: &str) -> Option<String> {
        FailurePolicy::DegradeToAbsent
            .execute("get_cache", || self.timed(self.backend.get(key)))
            .await
            .unwrap_or_default()
    }

    /// Writes a key in a single attempt; failures propagate.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        FailurePolicy::SingleAttempt
            .execute("set", || self.timed(self.backend.set(key, value, None)))
            .await
    }

    /// Degraded write with an optional expiry. Returns whether the value was stored.
    pub async fn set_cache(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        FailurePolicy::DegradeToAbsent
            .execute("set_cache", || async move {
                self.timed(self.backend.set(key, value, ttl)).await.map(|()| true)
            })
            .await
            .unwrap_or_default()
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
    ) -> Result<T, BackendError> {
        match tokio::time::timeout(self.settings.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Transient(format!(
                "timed out after {:?}",
                self.settings.timeout
            ))),
        }
    }
}

struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

/// Process-local backend backed by a hash map.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

impl MemoryBackend {
    pub const ENDPOINT: &'static str = "memory://";
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it unless a writer replaced it in between.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), BackendError> {
        let now = Instant::now();
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(key.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend that fails a fixed number of times before delegating to memory.
    struct FlakyBackend {
        failures: u32,
        error: BackendError,
        calls: AtomicU32,
        inner: MemoryBackend,
    }

    impl FlakyBackend {
        fn new(failures: u32, error: BackendError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                inner: MemoryBackend::default(),
            }
        }

        fn unreachable() -> Self {
            Self::new(u32::MAX, BackendError::Transient("connection refused".into()))
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn attempt(&self) -> Result<(), BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl KvBackend for FlakyBackend {
        async fn ping(&self) -> Result<(), BackendError> {
            self.attempt()
        }

        async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
            self.attempt()?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), BackendError> {
            self.attempt()?;
            self.inner.set(key, value, ttl).await
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl KvBackend for SlowBackend {
        async fn ping(&self) -> Result<(), BackendError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, BackendError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), BackendError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    fn settings(retries: u32) -> StoreSettings {
        StoreSettings {
            endpoint: "test://".to_string(),
            db: 2,
            retries,
            timeout: Duration::from_millis(50),
        }
    }

    fn store_with(backend: Arc<FlakyBackend>, retries: u32) -> ResilientStore {
        ResilientStore::new(backend, settings(retries))
    }

    #[test]
    fn test_retry_policy_never_below_one_attempt() {
        assert_eq!(RetryPolicy::new(0).attempts(), 1);
        assert_eq!(RetryPolicy::new(3).attempts(), 3);
    }

    #[tokio::test]
    async fn test_get_raises_after_retry_limit() {
        let backend = Arc::new(FlakyBackend::unreachable());
        let store = store_with(backend.clone(), 2);

        let err = store.get("i:1").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Unavailable {
                operation: "get",
                attempts: 2,
                ..
            }
        ));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_get_cache_degrades_to_absent() {
        let backend = Arc::new(FlakyBackend::unreachable());
        let store = store_with(backend.clone(), 3);

        assert_eq!(store.get_cache("i:1").await, None);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_get_cache_degrades_on_permanent_failure() {
        let backend = Arc::new(FlakyBackend::new(1, BackendError::Permanent("bad key".into())));
        let store = store_with(backend, 3);
        assert_eq!(store.get_cache("i:1").await, None);
    }

    #[tokio::test]
    async fn test_get_recovers_within_limit() {
        let backend = Arc::new(FlakyBackend::new(
            2,
            BackendError::Transient("timeout".into()),
        ));
        backend.inner.set("key", "value", None).await.unwrap();
        let store = store_with(backend.clone(), 3);

        assert_eq!(store.get("key").await.unwrap().as_deref(), Some("value"));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let backend = Arc::new(FlakyBackend::new(
            u32::MAX,
            BackendError::Permanent("wrong type".into()),
        ));
        let store = store_with(backend.clone(), 5);

        let err = store.get("key").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { operation: "get", .. }));
        assert_eq!(backend.calls(), 1);

        assert!(store.connect().await.is_err());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_connect_retries_then_raises() {
        let backend = Arc::new(FlakyBackend::unreachable());
        let store = store_with(backend.clone(), 3);
        assert!(matches!(
            store.connect().await,
            Err(StoreError::Unavailable { attempts: 3, .. })
        ));
        assert_eq!(backend.calls(), 3);

        let healthy = Arc::new(FlakyBackend::new(1, BackendError::Transient("reset".into())));
        let store = store_with(healthy.clone(), 3);
        assert!(store.connect().await.is_ok());
        assert_eq!(healthy.calls(), 2);
    }

    #[tokio::test]
    async fn test_set_single_attempt() {
        let backend = Arc::new(FlakyBackend::new(
            1,
            BackendError::Transient("connection reset".into()),
        ));
        let store = store_with(backend.clone(), 5);

        let err = store.set("key", "value").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { operation: "set", .. }));
        assert_eq!(backend.calls(), 1);

        store.set("key", "value").await.unwrap();
        assert_eq!(store.get("key").await.unwrap().as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn test_set_is_idempotent() {
        let store = ResilientStore::in_memory(settings(1));
        store.set("KEY", "LOLKEY").await.unwrap();
        let once = store.get("KEY").await.unwrap();
        store.set("KEY", "LOLKEY").await.unwrap();
        assert_eq!(store.get("KEY").await.unwrap(), once);
        assert_eq!(once.as_deref(), Some("LOLKEY"));
    }

    #[tokio::test]
    async fn test_set_cache_reports_failure_instead_of_raising() {
        let store = store_with(Arc::new(FlakyBackend::unreachable()), 3);
        assert!(!store.set_cache("uid:x", "3.0", None).await);

        let store = ResilientStore::in_memory(settings(1));
        assert!(store.set_cache("uid:x", "3.0", None).await);
        assert_eq!(store.get_cache("uid:x").await.as_deref(), Some("3.0"));
    }

    #[tokio::test]
    async fn test_cache_entries_expire() {
        let store = ResilientStore::in_memory(settings(1));
        assert!(store.set_cache("short", "1", Some(Duration::from_millis(10))).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get_cache("short").await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_purged() {
        let backend = MemoryBackend::default();
        for i in 0..100 {
            let key = format!("uid:{i}");
            backend.set(&key, "0.5", Some(Duration::from_millis(1))).await.unwrap();
        }
        backend.set("i:1", "[]", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.get("uid:0").await.unwrap(), None);
        assert_eq!(backend.entries.read().await.len(), 100);

        backend.set("uid:fresh", "3.0", Some(Duration::from_secs(60))).await.unwrap();
        let entries = backend.entries.read().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key("i:1"));
        assert!(entries.contains_key("uid:fresh"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let store = ResilientStore::new(Arc::new(SlowBackend), settings(2));

        assert!(matches!(
            store.get("key").await,
            Err(StoreError::Unavailable { attempts: 2, .. })
        ));
        assert_eq!(store.get_cache("key").await, None);
        assert!(store.set("key", "value").await.is_err());
    }
}
