use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use fetchcache_core::CacheKey;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Decides whether concurrent misses for one key may reach the transport
/// together.
#[async_trait]
pub trait ConcurrencyManager: Send + Sync {
    /// Waits until this caller may fetch `key`. The permit is held until the
    /// fetch finished and its result was stored.
    async fn acquire(&self, key: &CacheKey) -> ConcurrencyPermit;

    /// Whether a permit means other callers were held back, so the cache is
    /// worth checking again once it is granted.
    fn serializes(&self) -> bool {
        false
    }
}

/// Held while a fetch for a key is in flight.
#[must_use = "dropping the permit releases the key immediately"]
pub struct ConcurrencyPermit {
    inner: Option<KeyedPermit>,
}

impl ConcurrencyPermit {
    /// A permit that guards nothing.
    pub fn unrestricted() -> Self {
        Self { inner: None }
    }
}

impl std::fmt::Debug for ConcurrencyPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyPermit")
            .field("key", &self.inner.as_ref().map(|p| p.registration.key))
            .finish()
    }
}

/// No-op implementation that always allows requests to proceed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConcurrencyManager;

#[async_trait]
impl ConcurrencyManager for NoopConcurrencyManager {
    async fn acquire(&self, _key: &CacheKey) -> ConcurrencyPermit {
        ConcurrencyPermit::unrestricted()
    }
}

/// In-process single flight: one fetch per key at a time.
///
/// Callers missing the cache for a key that is already being fetched wait
/// for the first fetch to finish and then find its result on disk. Other
/// processes sharing the cache directory are not coordinated.
#[derive(Debug, Clone, Default)]
pub struct KeyedConcurrencyManager {
    in_flight: Arc<Registry>,
}

type Registry = DashMap<CacheKey, Arc<Slot>>;

#[derive(Debug, Default)]
struct Slot {
    /// Holders and waiters of `lock`.
    users: AtomicUsize,
    lock: Arc<Mutex<()>>,
}

impl KeyedConcurrencyManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held or waited on.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

#[async_trait]
impl ConcurrencyManager for KeyedConcurrencyManager {
    async fn acquire(&self, key: &CacheKey) -> ConcurrencyPermit {
        let slot = {
            let entry = self.in_flight.entry(*key).or_default();
            entry.users.fetch_add(1, Ordering::AcqRel);
            Arc::clone(entry.value())
        };
        // Registered before waiting, so a caller cancelled while queued
        // still releases its slot.
        let registration = Registration {
            key: *key,
            registry: Arc::clone(&self.in_flight),
        };
        let guard = Arc::clone(&slot.lock).lock_owned().await;
        trace!(?key, "Acquired single-flight permit");
        ConcurrencyPermit {
            inner: Some(KeyedPermit {
                _guard: guard,
                registration,
            }),
        }
    }

    fn serializes(&self) -> bool {
        true
    }
}

// Fields drop in order: the lock is released before the slot is left.
struct KeyedPermit {
    _guard: OwnedMutexGuard<()>,
    registration: Registration,
}

struct Registration {
    key: CacheKey,
    registry: Arc<Registry>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        // Decrements under the shard lock, so no acquirer can join between
        // the last user leaving and the removal.
        self.registry.remove_if(&self.key, |_, slot| {
            slot.users.fetch_sub(1, Ordering::AcqRel) == 1
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn noop_never_blocks() {
        let manager = NoopConcurrencyManager;
        let key = CacheKey::for_host("a.test");
        let _first = manager.acquire(&key).await;
        let _second = manager.acquire(&key).await;
        assert!(!manager.serializes());
    }

    #[tokio::test]
    async fn keyed_serializes_same_key() {
        let manager = KeyedConcurrencyManager::new();
        let key = CacheKey::for_host("a.test");

        let first = manager.acquire(&key).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), manager.acquire(&key)).await;
        assert!(blocked.is_err());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), manager.acquire(&key)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn keyed_allows_distinct_keys() {
        let manager = KeyedConcurrencyManager::new();
        let _a = manager.acquire(&CacheKey::for_host("a.test")).await;
        let b = tokio::time::timeout(
            Duration::from_secs(1),
            manager.acquire(&CacheKey::for_host("b.test")),
        )
        .await;
        assert!(b.is_ok());
        assert_eq!(manager.in_flight(), 2);
    }

    #[tokio::test]
    async fn cancelled_waiters_do_not_leak_slots() {
        let manager = KeyedConcurrencyManager::new();
        let key = CacheKey::for_host("a.test");

        let held = manager.acquire(&key).await;
        for _ in 0..3 {
            let waited = tokio::time::timeout(Duration::from_millis(10), manager.acquire(&key)).await;
            assert!(waited.is_err());
        }
        assert_eq!(manager.in_flight(), 1);

        drop(held);
        assert_eq!(manager.in_flight(), 0);

        let again = tokio::time::timeout(Duration::from_secs(1), manager.acquire(&key)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn registry_is_cleaned_up() {
        let manager = KeyedConcurrencyManager::new();
        let permit = manager.acquire(&CacheKey::for_host("a.test")).await;
        assert_eq!(manager.in_flight(), 1);
        drop(permit);
        assert_eq!(manager.in_flight(), 0);
    }
}
