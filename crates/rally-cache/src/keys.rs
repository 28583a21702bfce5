//! Cache key layout. Every writer and invalidator builds keys through these
//! helpers so both sides agree on the format.

use rally_types::models::{MatchId, PartyId};

/// Redis set holding the ids of connected parties.
pub const ONLINE_PARTIES: &str = "online:users";

pub fn profile(party: PartyId) -> String {
    format!("user:profile:{}", party)
}

pub fn matches(party: PartyId) -> String {
    format!("user:matches:{}", party)
}

pub fn match_messages(match_id: MatchId) -> String {
    format!("match:messages:{}", match_id)
}
