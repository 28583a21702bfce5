use std::future::Future;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use rally_gateway::PresenceChange;
use rally_types::error::{Error, Result};
use rally_types::events::GatewayEvent;
use rally_types::models::PartyId;

use crate::Engine;

impl Engine {
    pub async fn is_online(&self, party: PartyId) -> Result<bool> {
        self.inner
            .dispatcher
            .presence()
            .contains(party)
            .await
            .map_err(Error::from)
    }

    /// Parties `party` has matched with.
    pub(crate) async fn partners(&self, party: PartyId) -> Result<Vec<PartyId>> {
        let rows = self
            .db("matches_for_party", move |db| db.matches_for_party(party))
            .await?;
        Ok(rows.iter().filter_map(|m| m.other_party(party)).collect())
    }

    /// Tell a party's matches that it came online or went offline.
    pub async fn announce_presence(&self, change: PresenceChange) -> Result<()> {
        let partners = self.partners(change.party).await?;
        if partners.is_empty() {
            return Ok(());
        }

        let event = GatewayEvent::Presence {
            party_id: change.party,
            online: change.online,
        };
        let report = self.inner.dispatcher.deliver(&partners, &event).await;
        debug!(
            "Presence of {} (online={}) reached {} channel(s)",
            change.party, change.online, report.delivered
        );
        Ok(())
    }

    /// Background task relaying every presence transition to matched
    /// partners. Subscribes before returning, so no transition that happens
    /// after this call is missed.
    pub fn presence_fanout(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut changes = self.inner.dispatcher.subscribe_presence();
        let engine = self.clone();

        async move {
            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Presence fanout lagged by {} transitions", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if let Err(e) = engine.announce_presence(change).await {
                    warn!("Presence fanout for {} failed: {}", change.party, e);
                }
            }
        }
    }
}
