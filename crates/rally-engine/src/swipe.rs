use chrono::Utc;
use tracing::debug;

use rally_cache::keys;
use rally_types::api::SwipeResponse;
use rally_types::error::{Error, Result};
use rally_types::events::GatewayEvent;
use rally_types::models::{Direction, PartyId};

use crate::{Engine, MatchOutcome};

impl Engine {
    /// Record a swipe and, for a right swipe, detect the match. The interest
    /// and the match are written in one store transaction, so a failure
    /// leaves neither behind.
    ///
    /// Cache purges finish before this returns so the caller's next read is
    /// fresh. Only the call that created the match notifies the two parties.
    pub async fn swipe(
        &self,
        actor: PartyId,
        target: PartyId,
        direction: Direction,
    ) -> Result<SwipeResponse> {
        if actor == target {
            return Err(Error::InvalidRequest("cannot swipe on yourself".into()));
        }

        let now = Utc::now();
        let record = self
            .db("record_swipe", move |db| {
                db.record_swipe(actor, target, direction, now)
            })
            .await
            .map_err(|e| match e {
                Error::Conflict(_) => Error::Conflict(format!(
                    "party {} already swiped on party {}",
                    actor, target
                )),
                other => other,
            })?;
        debug!("Party {} swiped {} on {}", actor, direction.as_str(), target);

        let outcome = record.matched.map(MatchOutcome::from).unwrap_or_default();

        let mut stale = vec![keys::profile(actor)];
        if let (true, Some(m)) = (outcome.created, &outcome.matched) {
            stale.push(keys::matches(m.party_a_id));
            stale.push(keys::matches(m.party_b_id));
        }
        self.inner.invalidator.invalidate(&stale).await;

        if let (true, Some(m)) = (outcome.created, &outcome.matched) {
            self.inner
                .dispatcher
                .deliver(&m.participants(), &GatewayEvent::matched(m))
                .await;
        }

        Ok(SwipeResponse {
            is_match: outcome.matched.is_some(),
            matched: outcome.matched,
        })
    }
}
