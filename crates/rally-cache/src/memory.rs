//! In-process adapters for single-node deployments and tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use rally_types::models::PartyId;

use crate::{CacheError, KeyValueCache, PresenceSet};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// TTL-aware key-value store. Expired entries are dropped on read and by
/// [`run_sweep_loop`].
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        // remove_if takes the shard write lock, so an expired entry cannot be
        // refreshed between the check and the removal.
        if self
            .entries
            .remove_if(key, |_, entry| entry.expires_at <= now)
            .is_some()
        {
            return Ok(None);
        }
        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }
}

/// Background task that drops expired cache entries on an interval.
pub async fn run_sweep_loop(cache: Arc<MemoryCache>, interval: Duration) {
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        let dropped = cache.purge_expired();
        if dropped > 0 {
            debug!("Cache sweep: dropped {} expired entries", dropped);
        }
    }
}

#[derive(Default)]
pub struct MemoryPresence {
    online: DashSet<PartyId>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceSet for MemoryPresence {
    async fn add(&self, party: PartyId) -> Result<(), CacheError> {
        self.online.insert(party);
        Ok(())
    }

    async fn remove(&self, party: PartyId) -> Result<(), CacheError> {
        self.online.remove(&party);
        Ok(())
    }

    async fn contains(&self, party: PartyId) -> Result<bool, CacheError> {
        Ok(self.online.contains(&party))
    }

    async fn members(&self) -> Result<HashSet<PartyId>, CacheError> {
        Ok(self.online.iter().map(|party| *party).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let cache = MemoryCache::new();
        cache.set("a", b"1", Duration::ZERO).await.unwrap();
        cache.set("b", b"2", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.get("b").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let cache = MemoryCache::new();
        cache.set("old", b"x", Duration::ZERO).await.unwrap();
        cache.set("new", b"y", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cache = MemoryCache::new();
        cache.set("k", b"v", Duration::from_secs(60)).await.unwrap();

        let keys = vec!["k".to_string()];
        cache.delete(&keys).await.unwrap();
        cache.delete(&keys).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn presence_membership() {
        let presence = MemoryPresence::new();
        presence.add(PartyId(1)).await.unwrap();
        presence.add(PartyId(2)).await.unwrap();
        presence.remove(PartyId(1)).await.unwrap();

        assert!(!presence.contains(PartyId(1)).await.unwrap());
        assert!(presence.contains(PartyId(2)).await.unwrap());
        assert_eq!(
            presence.members().await.unwrap(),
            HashSet::from([PartyId(2)])
        );
    }
}
