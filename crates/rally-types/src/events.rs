use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::models::{Match, MatchId, Message, MessageId, MessageType, PartyId};

/// Events sent over the WebSocket gateway, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms the connection is registered
    Ready { party_id: PartyId },

    /// Both parties swiped right on each other
    Match {
        match_id: MatchId,
        party_a: PartyId,
        party_b: PartyId,
    },

    /// A chat message was persisted on a match
    Chat {
        match_id: MatchId,
        message_id: MessageId,
        sender_id: PartyId,
        content: String,
        message_type: MessageType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_url: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The other party started or stopped typing
    Typing {
        match_id: MatchId,
        party_id: PartyId,
        is_typing: bool,
    },

    /// A matched party came online or went offline
    Presence { party_id: PartyId, online: bool },

    /// A command from this channel was rejected
    Error { kind: ErrorKind, message: String },
}

impl GatewayEvent {
    pub fn matched(m: &Match) -> Self {
        Self::Match {
            match_id: m.id,
            party_a: m.party_a_id,
            party_b: m.party_b_id,
        }
    }

    pub fn chat(message: &Message) -> Self {
        Self::Chat {
            match_id: message.match_id,
            message_id: message.id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            message_type: message.message_type,
            media_url: message.media_url.clone(),
            timestamp: message.created_at,
        }
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Match { .. } => "match",
            Self::Chat { .. } => "chat",
            Self::Typing { .. } => "typing",
            Self::Presence { .. } => "presence",
            Self::Error { .. } => "error",
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Persist a message on a match and relay it to the other party
    Chat {
        match_id: MatchId,
        content: String,
        #[serde(default)]
        message_type: MessageType,
        #[serde(default)]
        media_url: Option<String>,
    },

    /// Relay a typing indicator to the other party
    Typing { match_id: MatchId, is_typing: bool },
}
