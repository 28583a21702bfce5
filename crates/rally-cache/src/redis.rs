//! Redis-backed adapters sharing one bb8 connection pool.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{self, PooledConnection};
use bb8_redis::redis;
use tracing::info;

use rally_types::models::PartyId;

use crate::keys::ONLINE_PARTIES;
use crate::{CacheError, KeyValueCache, PresenceSet};

pub type RedisPool = bb8::Pool<RedisConnectionManager>;

const POOL_SIZE: u32 = 16;

pub async fn connect(url: &str) -> Result<RedisPool, CacheError> {
    let manager = RedisConnectionManager::new(url).map_err(unavailable)?;
    let pool = bb8::Pool::builder()
        .max_size(POOL_SIZE)
        .build(manager)
        .await
        .map_err(unavailable)?;

    info!("Redis pool ready ({} connections max)", POOL_SIZE);
    Ok(pool)
}

fn unavailable(err: impl std::fmt::Display) -> CacheError {
    CacheError::Unavailable(err.to_string())
}

async fn checkout(pool: &RedisPool) -> Result<PooledConnection<'_, RedisConnectionManager>, CacheError> {
    pool.get().await.map_err(unavailable)
}

#[derive(Clone)]
pub struct RedisCache {
    pool: RedisPool,
}

impl RedisCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut conn = checkout(&self.pool).await?;
        // EX 0 is rejected by Redis; round sub-second TTLs up.
        let secs = ttl.as_secs().max(1);
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(secs)
            .query_async(&mut *conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = checkout(&self.pool).await?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(unavailable)?;
        Ok(value)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = checkout(&self.pool).await?;
        let _: i64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut *conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RedisPresence {
    pool: RedisPool,
}

impl RedisPresence {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceSet for RedisPresence {
    async fn add(&self, party: PartyId) -> Result<(), CacheError> {
        let mut conn = checkout(&self.pool).await?;
        let _: i64 = redis::cmd("SADD")
            .arg(ONLINE_PARTIES)
            .arg(party.0)
            .query_async(&mut *conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn remove(&self, party: PartyId) -> Result<(), CacheError> {
        let mut conn = checkout(&self.pool).await?;
        let _: i64 = redis::cmd("SREM")
            .arg(ONLINE_PARTIES)
            .arg(party.0)
            .query_async(&mut *conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn contains(&self, party: PartyId) -> Result<bool, CacheError> {
        let mut conn = checkout(&self.pool).await?;
        let member: bool = redis::cmd("SISMEMBER")
            .arg(ONLINE_PARTIES)
            .arg(party.0)
            .query_async(&mut *conn)
            .await
            .map_err(unavailable)?;
        Ok(member)
    }

    async fn members(&self) -> Result<HashSet<PartyId>, CacheError> {
        let mut conn = checkout(&self.pool).await?;
        let raw: Vec<i64> = redis::cmd("SMEMBERS")
            .arg(ONLINE_PARTIES)
            .query_async(&mut *conn)
            .await
            .map_err(unavailable)?;
        Ok(raw.into_iter().map(PartyId).collect())
    }
}
