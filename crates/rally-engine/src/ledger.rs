use chrono::Utc;
use tracing::debug;

use rally_types::error::{Error, Result};
use rally_types::models::{Direction, Interest, PartyId};

use crate::Engine;

impl Engine {
    /// Durably record one swipe. The store's unique constraint rejects a
    /// second swipe on the same target with [`Error::Conflict`]; the first
    /// row is never modified.
    pub async fn record_interest(
        &self,
        actor: PartyId,
        target: PartyId,
        direction: Direction,
    ) -> Result<Interest> {
        if actor == target {
            return Err(Error::InvalidRequest("cannot swipe on yourself".into()));
        }

        let now = Utc::now();
        let interest = self
            .db("insert_interest", move |db| {
                db.insert_interest(actor, target, direction, now)
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
        Ok(interest)
    }

    pub async fn lookup_interest(&self, actor: PartyId, target: PartyId) -> Result<Option<Interest>> {
        self.db("get_interest", move |db| db.get_interest(actor, target))
            .await
    }
}
