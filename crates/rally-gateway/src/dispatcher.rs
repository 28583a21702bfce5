use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use rally_cache::PresenceSet;
use rally_types::events::GatewayEvent;
use rally_types::models::PartyId;

use crate::registry::{ChannelDead, ChannelHandle, ChannelId, ConnectionRegistry, Frame};

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Upper bound on how long one channel may hold up a delivery.
    pub send_timeout: Duration,
    /// Frames buffered per channel before sends start waiting.
    pub channel_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            channel_capacity: 64,
        }
    }
}

/// A party gained its first or lost its last live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceChange {
    pub party: PartyId,
    pub online: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dead: usize,
}

/// A freshly registered channel. The connection task drains `frames` into
/// its socket and must call [`Dispatcher::disconnect`] when it exits.
#[derive(Debug)]
pub struct Connection {
    pub party: PartyId,
    pub channel: ChannelId,
    pub frames: mpsc::Receiver<Frame>,
}

/// Routes events to the live channels of their recipients.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    registry: ConnectionRegistry,
    presence: Arc<dyn PresenceSet>,
    config: DispatcherConfig,

    /// First-connect / last-disconnect transitions, including ones caused by
    /// reaping a dead channel.
    presence_tx: broadcast::Sender<PresenceChange>,

    /// Parties whose last published transition was `online`.
    announced: DashMap<PartyId, ()>,
}

impl Dispatcher {
    pub fn new(presence: Arc<dyn PresenceSet>, config: DispatcherConfig) -> Self {
        let (presence_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                registry: ConnectionRegistry::new(),
                presence,
                config,
                presence_tx,
                announced: DashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn presence(&self) -> &Arc<dyn PresenceSet> {
        &self.inner.presence
    }

    pub fn config(&self) -> DispatcherConfig {
        self.inner.config
    }

    pub fn subscribe_presence(&self) -> broadcast::Receiver<PresenceChange> {
        self.inner.presence_tx.subscribe()
    }

    /// Register a new channel for `party`. Marks the party online when this is
    /// its first channel.
    pub async fn connect(&self, party: PartyId) -> Connection {
        self.open(party, None).await
    }

    /// Like [`connect`](Self::connect), with `greeting` queued on the channel
    /// before it becomes visible to [`deliver`](Self::deliver). The greeting
    /// is always the first frame the connection reads.
    pub async fn connect_with_greeting(&self, party: PartyId, greeting: &GatewayEvent) -> Connection {
        self.open(party, Some(greeting)).await
    }

    async fn open(&self, party: PartyId, greeting: Option<&GatewayEvent>) -> Connection {
        let (tx, frames) = mpsc::channel(self.inner.config.channel_capacity.max(1));
        if let Some(frame) = greeting.and_then(encode) {
            // Fresh channel with capacity >= 1, nothing else holds the sender.
            if let Err(e) = tx.try_send(frame) {
                warn!("Greeting for party {} not queued: {}", party, e);
            }
        }

        let handle = ChannelHandle::new(party, tx);
        let channel = handle.id();

        let registered = self.inner.registry.register(handle);
        debug!("Channel {} registered for party {}", channel, party);

        if registered.first_for_party {
            if let Err(e) = self.inner.presence.add(party).await {
                warn!("Presence add for party {} failed: {}", party, e);
            }
            self.announce(party);
        }

        Connection {
            party,
            channel,
            frames,
        }
    }

    /// Drop a channel. Returns true when the party went offline. Safe to call
    /// more than once for the same channel.
    pub async fn disconnect(&self, party: PartyId, channel: ChannelId) -> bool {
        let out = self.inner.registry.unregister(party, channel);
        if !out.last_for_party {
            return false;
        }

        if let Err(e) = self.inner.presence.remove(party).await {
            warn!("Presence remove for party {} failed: {}", party, e);
        }

        // A reconnect may have registered between the unregister and the
        // presence removal above.
        if self.inner.registry.is_connected(party) {
            if let Err(e) = self.inner.presence.add(party).await {
                warn!("Presence re-add for party {} failed: {}", party, e);
            }
            debug!("Party {} reconnected during disconnect", party);
        }

        self.announce(party) == Some(false)
    }

    /// Push `event` to every live channel of every recipient. Each send gets
    /// the configured deadline; dead channels are reaped in the background
    /// and never fail the delivery.
    pub async fn deliver(&self, recipients: &[PartyId], event: &GatewayEvent) -> DeliveryReport {
        let Some(frame) = encode(event) else {
            return DeliveryReport::default();
        };

        let mut seen = HashSet::new();
        let handles: Vec<ChannelHandle> = recipients
            .iter()
            .filter(|party| seen.insert(**party))
            .flat_map(|party| self.inner.registry.channels_for(*party))
            .collect();

        if handles.is_empty() {
            debug!("No live channel for {} event to {:?}", event.kind(), recipients);
            return DeliveryReport::default();
        }

        let deadline = self.inner.config.send_timeout;
        let results = join_all(handles.iter().map(|h| h.send(frame.clone(), deadline))).await;

        let mut report = DeliveryReport::default();
        for (handle, result) in handles.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(dead) => {
                    report.dead += 1;
                    warn!(
                        "Dropping channel {} of party {}: {}",
                        handle.id(),
                        handle.party(),
                        dead
                    );
                    self.reap(handle.party(), handle.id());
                }
            }
        }

        debug!(
            "{} event delivered to {} channel(s), {} dead",
            event.kind(),
            report.delivered,
            report.dead
        );
        report
    }

    /// Targeted reply to a single channel, e.g. `ready` or `error`.
    pub async fn send_to_channel(
        &self,
        party: PartyId,
        channel: ChannelId,
        event: &GatewayEvent,
    ) -> Result<(), ChannelDead> {
        let handle = self
            .inner
            .registry
            .channel(party, channel)
            .ok_or(ChannelDead::Closed)?;

        let Some(frame) = encode(event) else {
            return Ok(());
        };
        handle.send(frame, self.inner.config.send_timeout).await
    }

    fn reap(&self, party: PartyId, channel: ChannelId) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if dispatcher.disconnect(party, channel).await {
                info!("Party {} went offline after its last channel died", party);
            }
        });
    }

    fn publish(&self, change: PresenceChange) {
        // No subscribers is fine.
        let _ = self.inner.presence_tx.send(change);
    }

    /// Publish the party's registry state if it differs from the last
    /// transition published for it. The check and the send happen under the
    /// party's entry lock, so concurrent connects and disconnects publish
    /// alternating transitions and the last one matches the registry.
    fn announce(&self, party: PartyId) -> Option<bool> {
        let entry = self.inner.announced.entry(party);
        let online = self.inner.registry.is_connected(party);

        let change = PresenceChange { party, online };
        match (entry, online) {
            (Entry::Vacant(e), true) => {
                self.publish(change);
                e.insert(());
            }
            (Entry::Occupied(e), false) => {
                self.publish(change);
                e.remove();
            }
            _ => return None,
        }
        Some(online)
    }
}

fn encode(event: &GatewayEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json.into()),
        Err(e) => {
            error!("Failed to encode {} event: {}", event.kind(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rally_cache::memory::MemoryPresence;
    use rally_types::models::MatchId;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(
            Arc::new(MemoryPresence::new()),
            DispatcherConfig {
                send_timeout: Duration::from_millis(50),
                channel_capacity: 4,
            },
        )
    }

    fn typing(party: i64) -> GatewayEvent {
        GatewayEvent::Typing {
            match_id: MatchId(1),
            party_id: PartyId(party),
            is_typing: true,
        }
    }

    #[tokio::test]
    async fn delivers_once_per_channel_with_duplicate_recipients() {
        let dispatcher = dispatcher();
        let mut a1 = dispatcher.connect(PartyId(1)).await;
        let mut a2 = dispatcher.connect(PartyId(1)).await;
        let mut b = dispatcher.connect(PartyId(2)).await;

        let report = dispatcher
            .deliver(&[PartyId(1), PartyId(1)], &typing(2))
            .await;
        assert_eq!(report, DeliveryReport { delivered: 2, dead: 0 });

        let expected = serde_json::to_string(&typing(2)).unwrap();
        assert_eq!(&*a1.frames.recv().await.unwrap(), expected);
        assert_eq!(&*a2.frames.recv().await.unwrap(), expected);
        assert!(a1.frames.try_recv().is_err());
        assert!(b.frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_recipient_is_dropped_silently() {
        let dispatcher = dispatcher();
        let report = dispatcher.deliver(&[PartyId(42)], &typing(1)).await;
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn dead_channel_is_reaped_and_others_still_receive() {
        let dispatcher = dispatcher();
        let dead = dispatcher.connect(PartyId(1)).await;
        let mut live = dispatcher.connect(PartyId(1)).await;
        drop(dead.frames);

        let report = dispatcher.deliver(&[PartyId(1)], &typing(2)).await;
        assert_eq!(report, DeliveryReport { delivered: 1, dead: 1 });
        assert!(live.frames.recv().await.is_some());

        for _ in 0..50 {
            if dispatcher.registry().channel_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(dispatcher.registry().channel_count(), 1);
        assert!(dispatcher.registry().channel(PartyId(1), dead.channel).is_none());
    }

    #[tokio::test]
    async fn slow_channel_times_out() {
        let dispatcher = dispatcher();
        let _stalled = dispatcher.connect(PartyId(1)).await;

        for _ in 0..4 {
            dispatcher.deliver(&[PartyId(1)], &typing(2)).await;
        }
        let report = dispatcher.deliver(&[PartyId(1)], &typing(2)).await;
        assert_eq!(report, DeliveryReport { delivered: 0, dead: 1 });
    }

    #[tokio::test]
    async fn presence_follows_first_and_last_channel() {
        let dispatcher = dispatcher();
        let mut changes = dispatcher.subscribe_presence();

        let a = dispatcher.connect(PartyId(1)).await;
        let b = dispatcher.connect(PartyId(1)).await;
        assert!(dispatcher.presence().contains(PartyId(1)).await.unwrap());
        assert_eq!(
            changes.try_recv().unwrap(),
            PresenceChange { party: PartyId(1), online: true }
        );
        assert!(changes.try_recv().is_err());

        assert!(!dispatcher.disconnect(PartyId(1), a.channel).await);
        assert!(dispatcher.presence().contains(PartyId(1)).await.unwrap());

        assert!(dispatcher.disconnect(PartyId(1), b.channel).await);
        assert!(!dispatcher.presence().contains(PartyId(1)).await.unwrap());
        assert_eq!(
            changes.try_recv().unwrap(),
            PresenceChange { party: PartyId(1), online: false }
        );

        // Second disconnect of the same channel changes nothing.
        assert!(!dispatcher.disconnect(PartyId(1), b.channel).await);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn reconnect_racing_a_disconnect_keeps_the_party_online() {
        let dispatcher = dispatcher();
        let mut changes = dispatcher.subscribe_presence();
        let old = dispatcher.connect(PartyId(1)).await;
        assert_eq!(
            changes.try_recv().unwrap(),
            PresenceChange { party: PartyId(1), online: true }
        );

        // A reconnect that registered but has not announced itself yet.
        let (tx, _frames) = mpsc::channel(1);
        let fresh = ChannelHandle::new(PartyId(1), tx);
        let fresh_id = fresh.id();
        dispatcher.registry().register(fresh);

        assert!(!dispatcher.disconnect(PartyId(1), old.channel).await);
        assert_eq!(dispatcher.announce(PartyId(1)), None);
        assert!(changes.try_recv().is_err());
        assert!(dispatcher.presence().contains(PartyId(1)).await.unwrap());

        assert!(dispatcher.disconnect(PartyId(1), fresh_id).await);
        assert_eq!(
            changes.try_recv().unwrap(),
            PresenceChange { party: PartyId(1), online: false }
        );
    }

    #[tokio::test]
    async fn greeting_is_the_first_frame() {
        let dispatcher = dispatcher();
        let ready = GatewayEvent::Ready { party_id: PartyId(1) };
        let mut conn = dispatcher.connect_with_greeting(PartyId(1), &ready).await;
        dispatcher.deliver(&[PartyId(1)], &typing(2)).await;

        let first = conn.frames.recv().await.unwrap();
        assert_eq!(&*first, serde_json::to_string(&ready).unwrap());
        let second = conn.frames.recv().await.unwrap();
        assert_eq!(&*second, serde_json::to_string(&typing(2)).unwrap());
    }

    #[tokio::test]
    async fn send_to_channel_targets_one_connection() {
        let dispatcher = dispatcher();
        let mut a = dispatcher.connect(PartyId(1)).await;
        let mut b = dispatcher.connect(PartyId(1)).await;

        let ready = GatewayEvent::Ready { party_id: PartyId(1) };
        dispatcher
            .send_to_channel(PartyId(1), a.channel, &ready)
            .await
            .unwrap();

        assert!(a.frames.recv().await.is_some());
        assert!(b.frames.try_recv().is_err());

        dispatcher.disconnect(PartyId(1), a.channel).await;
        assert_eq!(
            dispatcher.send_to_channel(PartyId(1), a.channel, &ready).await,
            Err(ChannelDead::Closed)
        );
    }
}
