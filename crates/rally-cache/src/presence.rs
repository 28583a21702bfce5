use std::collections::HashSet;

use async_trait::async_trait;

use rally_types::models::PartyId;

use crate::CacheError;

/// Shared set of parties that currently hold at least one live channel.
#[async_trait]
pub trait PresenceSet: Send + Sync {
    async fn add(&self, party: PartyId) -> Result<(), CacheError>;

    async fn remove(&self, party: PartyId) -> Result<(), CacheError>;

    async fn contains(&self, party: PartyId) -> Result<bool, CacheError>;

    async fn members(&self) -> Result<HashSet<PartyId>, CacheError>;
}
