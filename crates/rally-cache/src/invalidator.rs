use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::KeyValueCache;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(25);

/// Purges derived cache entries after a write.
///
/// Invalidation is a best-effort side channel: it is awaited so the caller's
/// next read is fresh, but a cache outage never fails the write. The TTL on
/// every cached value bounds staleness when all attempts fail.
#[derive(Clone)]
pub struct Invalidator {
    store: Arc<dyn KeyValueCache>,
    max_attempts: u32,
    backoff: Duration,
}

impl Invalidator {
    pub fn new(store: Arc<dyn KeyValueCache>) -> Self {
        Self {
            store,
            max_attempts: MAX_ATTEMPTS,
            backoff: INITIAL_BACKOFF,
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Delete `keys`, retrying with exponential backoff. Returns whether the
    /// delete eventually succeeded; failures are only logged.
    pub async fn invalidate(&self, keys: &[String]) -> bool {
        if keys.is_empty() {
            return true;
        }

        let mut delay = self.backoff;
        for attempt in 1..=self.max_attempts {
            match self.store.delete(keys).await {
                Ok(()) => {
                    debug!("Invalidated {:?}", keys);
                    return true;
                }
                Err(e) if attempt < self.max_attempts => {
                    debug!(
                        "Invalidation of {:?} failed (attempt {}/{}): {}",
                        keys, attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    warn!(
                        "Giving up invalidating {:?} after {} attempts, entries expire by TTL: {}",
                        keys, attempt, e
                    );
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheError;
    use crate::memory::MemoryCache;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` deletes, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl KeyValueCache for Flaky {
        async fn set(&self, _: &str, _: &[u8], _: Duration) -> Result<(), CacheError> {
            Ok(())
        }

        async fn get(&self, _: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Ok(None)
        }

        async fn delete(&self, _: &[String]) -> Result<(), CacheError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(CacheError::Unavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn purges_keys() {
        let store = Arc::new(MemoryCache::new());
        store
            .set("user:matches:1", b"[]", Duration::from_secs(60))
            .await
            .unwrap();

        let invalidator = Invalidator::new(store.clone());
        assert!(invalidator.invalidate(&["user:matches:1".to_string()]).await);
        assert!(store.get("user:matches:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let store = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let invalidator = Invalidator::new(store.clone()).with_retry(3, Duration::from_millis(1));

        assert!(invalidator.invalidate(&["k".to_string()]).await);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_without_error() {
        let store = Arc::new(Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let invalidator = Invalidator::new(store.clone()).with_retry(2, Duration::from_millis(1));

        assert!(!invalidator.invalidate(&["k".to_string()]).await);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }
}
