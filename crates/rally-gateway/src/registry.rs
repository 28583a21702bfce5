use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use uuid::Uuid;

use rally_types::models::PartyId;

/// A serialized event, shared by every channel it is delivered to.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Internal signal that a channel can no longer take frames. Never surfaced
/// to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelDead {
    #[error("channel closed")]
    Closed,

    #[error("send deadline elapsed")]
    Timeout,
}

/// Sending half of one live connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: ChannelId,
    party: PartyId,
    tx: mpsc::Sender<Frame>,
}

impl ChannelHandle {
    pub fn new(party: PartyId, tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id: ChannelId::new(),
            party,
            tx,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn party(&self) -> PartyId {
        self.party
    }

    /// Queue a frame, waiting at most `deadline` for room in the queue.
    pub async fn send(&self, frame: Frame, deadline: Duration) -> Result<(), ChannelDead> {
        self.tx
            .send_timeout(frame, deadline)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => ChannelDead::Timeout,
                SendTimeoutError::Closed(_) => ChannelDead::Closed,
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    pub first_for_party: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unregistered {
    pub removed: bool,
    pub last_for_party: bool,
}

/// Party → live channels. Sharded, so registering or removing a channel only
/// locks the shard holding that party.
#[derive(Default)]
pub struct ConnectionRegistry {
    parties: DashMap<PartyId, HashMap<ChannelId, ChannelHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: ChannelHandle) -> Registered {
        let mut channels = self.parties.entry(handle.party()).or_default();
        let first_for_party = channels.is_empty();
        channels.insert(handle.id(), handle);
        Registered { first_for_party }
    }

    /// Remove one channel. The party's entry is dropped under the same shard
    /// lock when its last channel goes, so a concurrent `register` either sees
    /// the old entry or creates a fresh one.
    pub fn unregister(&self, party: PartyId, channel: ChannelId) -> Unregistered {
        match self.parties.entry(party) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&channel).is_some();
                let last_for_party = removed && entry.get().is_empty();
                if entry.get().is_empty() {
                    entry.remove();
                }
                Unregistered {
                    removed,
                    last_for_party,
                }
            }
            Entry::Vacant(_) => Unregistered {
                removed: false,
                last_for_party: false,
            },
        }
    }

    /// Snapshot of a party's channels. The shard lock is released before
    /// returning, so callers may await on the handles.
    pub fn channels_for(&self, party: PartyId) -> Vec<ChannelHandle> {
        self.parties
            .get(&party)
            .map(|channels| channels.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn channel(&self, party: PartyId, channel: ChannelId) -> Option<ChannelHandle> {
        self.parties
            .get(&party)
            .and_then(|channels| channels.get(&channel).cloned())
    }

    pub fn is_connected(&self, party: PartyId) -> bool {
        self.parties.contains_key(&party)
    }

    pub fn connected_parties(&self) -> Vec<PartyId> {
        self.parties.iter().map(|entry| *entry.key()).collect()
    }

    pub fn channel_count(&self) -> usize {
        self.parties.iter().map(|entry| entry.value().len()).sum()
    }
}
