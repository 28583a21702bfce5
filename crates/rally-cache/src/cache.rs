use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use rally_types::error::Error as RallyError;

/// Default lifetime of every cached value. Bounds how long a missed
/// invalidation can serve stale data.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache value codec: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<CacheError> for RallyError {
    fn from(err: CacheError) -> Self {
        RallyError::TransientStore(err.to_string())
    }
}

/// External key-value store used to shortcut repeated reads.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;
}

/// Read-through JSON helpers over a [`KeyValueCache`]. Cache trouble never
/// fails a read: errors are logged and treated as a miss.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn KeyValueCache>,
    ttl: Duration,
}

impl Cache {
    pub fn new(store: Arc<dyn KeyValueCache>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn store(&self) -> Arc<dyn KeyValueCache> {
        self.store.clone()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read of {} failed: {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => {
                debug!("Cache hit for {}", key);
                Some(value)
            }
            Err(e) => {
                // Unreadable entries would otherwise be served until TTL expiry.
                warn!("Dropping undecodable cache entry {}: {}", key, e);
                if let Err(e) = self.store.delete(&[key.to_string()]).await {
                    warn!("Cache delete of {} failed: {}", key, e);
                }
                None
            }
        }
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_vec(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache encode of {} failed: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.store.set(key, &raw, self.ttl).await {
            warn!("Cache write of {} failed: {}", key, e);
        }
    }
}
