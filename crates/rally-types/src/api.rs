use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::models::{Direction, Match, MatchId, Message, MessageType, PartyId};

// -- JWT Claims --

/// Bearer-token claims accepted by both the REST middleware and the gateway
/// upgrade. `sub` is the authenticated party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: PartyId,
    pub exp: usize,
}

// -- Swipes / matches --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwipeRequest {
    pub swipee_id: PartyId,
    pub direction: Direction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwipeResponse {
    pub is_match: bool,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<Match>,
}

/// One entry of "my matches", seen from the requesting party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub id: MatchId,
    pub party_id: PartyId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchListResponse {
    pub matches: Vec<MatchSummary>,
    pub count: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub match_id: MatchId,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub media_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub count: usize,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypingRequest {
    pub match_id: MatchId,
    pub is_typing: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread_count: u64,
}

// -- Presence --

#[derive(Debug, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub party_id: PartyId,
    pub online: bool,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}
