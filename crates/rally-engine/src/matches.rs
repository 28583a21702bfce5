use rally_cache::keys;
use rally_types::api::MatchSummary;
use rally_types::error::{Error, Result};
use rally_types::models::{Match, MatchId, PartyId};

use crate::Engine;

impl Engine {
    /// The party's matches, newest first, read through the cache.
    pub async fn matches_for(&self, party: PartyId) -> Result<Vec<MatchSummary>> {
        let key = keys::matches(party);
        if let Some(hit) = self.inner.cache.get_json::<Vec<MatchSummary>>(&key).await {
            return Ok(hit);
        }

        let rows = self
            .db("matches_for_party", move |db| db.matches_for_party(party))
            .await?;
        let summaries: Vec<MatchSummary> = rows
            .iter()
            .filter_map(|m| {
                m.other_party(party).map(|other| MatchSummary {
                    id: m.id,
                    party_id: other,
                    created_at: m.created_at,
                })
            })
            .collect();

        self.inner.cache.put_json(&key, &summaries).await;
        Ok(summaries)
    }

    /// A single match, visible only to its two parties.
    pub async fn get_match(&self, party: PartyId, id: MatchId) -> Result<Match> {
        let found = self
            .db("get_match", move |db| db.get_match(id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("match {}", id)))?;

        if !found.includes(party) {
            return Err(Error::NotAuthorized(format!(
                "party {} is not part of match {}",
                party, id
            )));
        }
        Ok(found)
    }

    /// Resolve the counterpart of `party` on a match, rejecting outsiders.
    pub(crate) async fn counterpart(&self, match_id: MatchId, party: PartyId) -> Result<PartyId> {
        let (a, b) = self
            .db("find_match_participants", move |db| {
                db.find_match_participants(match_id)
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("match {}", match_id)))?;

        if party == a {
            Ok(b)
        } else if party == b {
            Ok(a)
        } else {
            Err(Error::NotAuthorized(format!(
                "party {} is not part of match {}",
                party, match_id
            )))
        }
    }
}
