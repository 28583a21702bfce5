//! Database row types. These map directly to SQLite rows.
//! Distinct from rally-types models to keep the DB layer independent; the
//! `TryFrom` impls are the only place stored text is parsed back.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use rally_types::models::{Interest, Match, MatchId, Message, MessageId, PartyId};

use crate::DbError;

pub struct InterestRow {
    pub actor_id: i64,
    pub target_id: i64,
    pub direction: String,
    pub created_at: String,
}

pub struct MatchRow {
    pub id: i64,
    pub party_a_id: i64,
    pub party_b_id: i64,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub match_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub message_type: String,
    pub media_url: Option<String>,
    pub created_at: String,
}

impl TryFrom<InterestRow> for Interest {
    type Error = DbError;

    fn try_from(row: InterestRow) -> Result<Self, Self::Error> {
        Ok(Interest {
            actor_id: PartyId(row.actor_id),
            target_id: PartyId(row.target_id),
            direction: row.direction.parse().map_err(DbError::Corrupt)?,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<MatchRow> for Match {
    type Error = DbError;

    fn try_from(row: MatchRow) -> Result<Self, Self::Error> {
        Ok(Match {
            id: MatchId(row.id),
            party_a_id: PartyId(row.party_a_id),
            party_b_id: PartyId(row.party_b_id),
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = DbError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: MessageId(row.id),
            match_id: MatchId(row.match_id),
            sender_id: PartyId(row.sender_id),
            content: row.content,
            message_type: row.message_type.parse().map_err(DbError::Corrupt)?,
            media_url: row.media_url,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

/// Timestamps are stored at millisecond precision; callers keep the truncated
/// value so that returned models equal what a later read produces.
pub(crate) fn stored_timestamp(ts: DateTime<Utc>) -> (DateTime<Utc>, String) {
    let ts = ts.trunc_subsecs(3);
    (ts, ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand through the sqlite shell use datetime('now').
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| DbError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}
