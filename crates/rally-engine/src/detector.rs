use chrono::Utc;
use tracing::{debug, info};

use rally_db::MatchInsert;
use rally_types::error::{Error, Result};
use rally_types::models::{CanonicalPair, Match, PartyId};

use crate::Engine;

/// Result of checking a right swipe for reciprocity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// The pair's match, whether or not this call created it.
    pub matched: Option<Match>,
    /// True only for the single caller whose insert won.
    pub created: bool,
}

impl From<MatchInsert> for MatchOutcome {
    fn from(inserted: MatchInsert) -> Self {
        match inserted {
            MatchInsert::Created(m) => {
                info!(
                    "Match {} formed between {} and {}",
                    m.id, m.party_a_id, m.party_b_id
                );
                Self {
                    matched: Some(m),
                    created: true,
                }
            }
            MatchInsert::Existing(m) => {
                debug!(
                    "Match {} already existed for {} and {}",
                    m.id, m.party_a_id, m.party_b_id
                );
                Self {
                    matched: Some(m),
                    created: false,
                }
            }
        }
    }
}

impl Engine {
    /// Materialize the match between `actor` and `target` if `target` has
    /// already swiped right on `actor`.
    ///
    /// The reverse-interest read is only a shortcut. Exclusivity comes from
    /// the store's unique constraint on the canonical pair: concurrent callers
    /// all reach `insert_match_if_absent` and exactly one sees `Created`. The
    /// others get the existing match, never an error.
    pub async fn try_form_match(&self, actor: PartyId, target: PartyId) -> Result<MatchOutcome> {
        let pair = CanonicalPair::new(actor, target)
            .ok_or_else(|| Error::InvalidRequest("a match needs two distinct parties".into()))?;

        let reciprocated = self
            .db("has_right_interest", move |db| db.has_right_interest(target, actor))
            .await?;
        if !reciprocated {
            return Ok(MatchOutcome::default());
        }

        let now = Utc::now();
        let inserted = self
            .db("insert_match", move |db| db.insert_match_if_absent(pair, now))
            .await?;
        Ok(MatchOutcome::from(inserted))
    }
}
