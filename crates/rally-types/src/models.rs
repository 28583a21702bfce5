use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }
    };
}

id_type!(
    /// Authenticated party (user) identifier.
    PartyId
);
id_type!(MatchId);
id_type!(MessageId);

/// Direction of a swipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// A directional, immutable swipe from `actor_id` toward `target_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub actor_id: PartyId,
    pub target_id: PartyId,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
}

/// Two distinct party ids stored low-then-high so that an unordered pair has
/// exactly one representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalPair {
    low: PartyId,
    high: PartyId,
}

impl CanonicalPair {
    /// Returns `None` when both ids are the same party.
    pub fn new(x: PartyId, y: PartyId) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self { low: x, high: y }),
            std::cmp::Ordering::Greater => Some(Self { low: y, high: x }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn party_a(&self) -> PartyId {
        self.low
    }

    pub fn party_b(&self) -> PartyId {
        self.high
    }
}

/// A persisted mutual match. `party_a_id < party_b_id` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub party_a_id: PartyId,
    pub party_b_id: PartyId,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn participants(&self) -> [PartyId; 2] {
        [self.party_a_id, self.party_b_id]
    }

    pub fn includes(&self, party: PartyId) -> bool {
        self.party_a_id == party || self.party_b_id == party
    }

    /// The counterpart of `party`, or `None` if `party` is not in this match.
    pub fn other_party(&self, party: PartyId) -> Option<PartyId> {
        if party == self.party_a_id {
            Some(self.party_b_id)
        } else if party == self.party_b_id {
            Some(self.party_a_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Audio,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            other => Err(format!("unknown message type '{}'", other)),
        }
    }
}

/// A chat message persisted within a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub match_id: MatchId,
    pub sender_id: PartyId,
    pub content: String,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_orders_ids() {
        let pair = CanonicalPair::new(PartyId(9), PartyId(4)).unwrap();
        assert_eq!(pair.party_a(), PartyId(4));
        assert_eq!(pair.party_b(), PartyId(9));
        assert_eq!(pair, CanonicalPair::new(PartyId(4), PartyId(9)).unwrap());
    }

    #[test]
    fn canonical_pair_rejects_self() {
        assert!(CanonicalPair::new(PartyId(3), PartyId(3)).is_none());
    }

    #[test]
    fn other_party_resolves_both_sides() {
        let m = Match {
            id: MatchId(1),
            party_a_id: PartyId(2),
            party_b_id: PartyId(5),
            created_at: Utc::now(),
        };
        assert_eq!(m.other_party(PartyId(2)), Some(PartyId(5)));
        assert_eq!(m.other_party(PartyId(5)), Some(PartyId(2)));
        assert_eq!(m.other_party(PartyId(7)), None);
        assert!(!m.includes(PartyId(7)));
    }

    #[test]
    fn direction_parses_stored_values() {
        assert_eq!("right".parse::<Direction>().unwrap(), Direction::Right);
        assert!("up".parse::<Direction>().is_err());
    }
}
