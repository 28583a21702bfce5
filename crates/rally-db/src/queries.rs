use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, TransactionBehavior, params};
use tracing::debug;

use rally_types::models::{
    CanonicalPair, Direction, Interest, Match, MatchId, Message, MessageId, MessageType, PartyId,
};

use crate::models::{InterestRow, MatchRow, MessageRow, stored_timestamp};
use crate::{Database, DbError, Result};

/// Outcome of the atomic "insert or report conflict" match primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchInsert {
    /// This call created the row.
    Created(Match),
    /// The canonical pair already had a row; nothing was written.
    Existing(Match),
}

/// What one swipe wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwipeRecord {
    pub interest: Interest,
    /// Set when the swipe completed a mutual right pair.
    pub matched: Option<MatchInsert>,
}

const MATCH_COLUMNS: &str = "id, party_a_id, party_b_id, created_at";
const MESSAGE_COLUMNS: &str =
    "id, match_id, sender_id, content, message_type, media_url, created_at";

impl Database {
    // -- Interests --

    /// Insert a swipe. A second swipe on the same (actor, target) pair fails
    /// with [`DbError::Conflict`] and leaves the first row untouched.
    pub fn insert_interest(
        &self,
        actor: PartyId,
        target: PartyId,
        direction: Direction,
        created_at: DateTime<Utc>,
    ) -> Result<Interest> {
        let (created_at, stamp) = stored_timestamp(created_at);
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO interests (actor_id, target_id, direction, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![actor.0, target.0, direction.as_str(), stamp],
            )?;
            Ok(())
        })?;

        Ok(Interest {
            actor_id: actor,
            target_id: target,
            direction,
            created_at,
        })
    }

    pub fn get_interest(&self, actor: PartyId, target: PartyId) -> Result<Option<Interest>> {
        self.with_conn(|conn| query_interest(conn, actor, target))
    }

    pub fn has_right_interest(&self, actor: PartyId, target: PartyId) -> Result<bool> {
        self.with_conn(|conn| query_has_right_interest(conn, actor, target))
    }

    /// Record a swipe and, when it completes a mutual right pair, the match
    /// in one transaction. The interest and the match commit together or not
    /// at all.
    ///
    /// A repeated swipe is a [`DbError::Conflict`], except a repeated right
    /// swipe whose mutual pair has no match yet: that one creates the match.
    pub fn record_swipe(
        &self,
        actor: PartyId,
        target: PartyId,
        direction: Direction,
        created_at: DateTime<Utc>,
    ) -> Result<SwipeRecord> {
        let (created_at, stamp) = stored_timestamp(created_at);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let inserted = tx.execute(
                "INSERT INTO interests (actor_id, target_id, direction, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(actor_id, target_id) DO NOTHING",
                params![actor.0, target.0, direction.as_str(), stamp],
            )?;

            let reciprocated = direction == Direction::Right
                && query_has_right_interest(&tx, target, actor)?;
            let pair = CanonicalPair::new(actor, target);

            let interest = if inserted == 1 {
                Interest {
                    actor_id: actor,
                    target_id: target,
                    direction,
                    created_at,
                }
            } else {
                let existing = query_interest(&tx, actor, target)?.ok_or_else(|| {
                    DbError::Corrupt(format!(
                        "interest {} -> {} ignored but no row found",
                        actor, target
                    ))
                })?;
                let unfinished = match pair {
                    Some(pair) => {
                        existing.direction == Direction::Right
                            && reciprocated
                            && query_match_for_pair(&tx, pair)?.is_none()
                    }
                    None => false,
                };
                if !unfinished {
                    return Err(DbError::Conflict(format!(
                        "interest {} -> {} already recorded",
                        actor, target
                    )));
                }
                debug!("Completing unmatched mutual pair {}/{}", actor, target);
                existing
            };

            let matched = match (reciprocated, pair) {
                (true, Some(pair)) => Some(insert_match(&tx, pair, created_at, &stamp)?),
                _ => None,
            };

            tx.commit()?;
            Ok(SwipeRecord { interest, matched })
        })
    }

    // -- Matches --

    /// Create the match row for `pair` unless one exists. The unique
    /// constraint on the canonical pair is the only arbiter between
    /// concurrent callers: exactly one of them sees `Created`.
    pub fn insert_match_if_absent(
        &self,
        pair: CanonicalPair,
        created_at: DateTime<Utc>,
    ) -> Result<MatchInsert> {
        let (created_at, stamp) = stored_timestamp(created_at);
        self.with_conn_mut(|conn| insert_match(conn, pair, created_at, &stamp))
    }

    pub fn get_match(&self, id: MatchId) -> Result<Option<Match>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM matches WHERE id = ?1", MATCH_COLUMNS);
            conn.query_row(&sql, [id.0], match_row)
                .optional()?
                .map(Match::try_from)
                .transpose()
        })
    }

    pub fn get_match_for_pair(&self, pair: CanonicalPair) -> Result<Option<Match>> {
        self.with_conn(|conn| query_match_for_pair(conn, pair))
    }

    pub fn find_match_participants(&self, id: MatchId) -> Result<Option<(PartyId, PartyId)>> {
        Ok(self
            .get_match(id)?
            .map(|m| (m.party_a_id, m.party_b_id)))
    }

    /// Newest first.
    pub fn matches_for_party(&self, party: PartyId) -> Result<Vec<Match>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM matches WHERE party_a_id = ?1 OR party_b_id = ?1
                 ORDER BY created_at DESC, id DESC",
                MATCH_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([party.0], match_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(Match::try_from).collect()
        })
    }

    pub fn is_participant(&self, id: MatchId, party: PartyId) -> Result<bool> {
        self.with_conn(|conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM matches
                 WHERE id = ?1 AND (party_a_id = ?2 OR party_b_id = ?2))",
                params![id.0, party.0],
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        match_id: MatchId,
        sender: PartyId,
        content: &str,
        message_type: MessageType,
        media_url: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<Message> {
        let (created_at, stamp) = stored_timestamp(created_at);
        let id = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (match_id, sender_id, content, message_type, media_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![match_id.0, sender.0, content, message_type.as_str(), media_url, stamp],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(Message {
            id: MessageId(id),
            match_id,
            sender_id: sender,
            content: content.to_string(),
            message_type,
            media_url: media_url.map(str::to_string),
            created_at,
        })
    }

    pub fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
            conn.query_row(&sql, [id.0], message_row)
                .optional()?
                .map(Message::try_from)
                .transpose()
        })
    }

    /// Newest first, `limit` rows starting after `offset`.
    pub fn get_messages(&self, match_id: MatchId, limit: u32, offset: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| query_messages(conn, match_id, limit, offset))
    }

    pub fn latest_message(&self, match_id: MatchId) -> Result<Option<Message>> {
        Ok(self
            .with_conn(|conn| query_messages(conn, match_id, 1, 0))?
            .into_iter()
            .next())
    }

    /// Messages on the match sent by the other party. There is no per-reader
    /// read marker, so this counts everything the reader did not write.
    pub fn unread_count(&self, match_id: MatchId, reader: PartyId) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE match_id = ?1 AND sender_id <> ?2",
                params![match_id.0, reader.0],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
    }

    /// Returns whether a row was removed.
    pub fn delete_message(&self, id: MessageId) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute("DELETE FROM messages WHERE id = ?1", [id.0])?;
            Ok(removed > 0)
        })
    }
}

fn match_row(row: &Row<'_>) -> rusqlite::Result<MatchRow> {
    Ok(MatchRow {
        id: row.get(0)?,
        party_a_id: row.get(1)?,
        party_b_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        match_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        message_type: row.get(4)?,
        media_url: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn query_interest(conn: &Connection, actor: PartyId, target: PartyId) -> Result<Option<Interest>> {
    conn.query_row(
        "SELECT actor_id, target_id, direction, created_at FROM interests
         WHERE actor_id = ?1 AND target_id = ?2",
        params![actor.0, target.0],
        |row| {
            Ok(InterestRow {
                actor_id: row.get(0)?,
                target_id: row.get(1)?,
                direction: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()?
    .map(Interest::try_from)
    .transpose()
}

fn query_has_right_interest(conn: &Connection, actor: PartyId, target: PartyId) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM interests
         WHERE actor_id = ?1 AND target_id = ?2 AND direction = 'right')",
        params![actor.0, target.0],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// `ON CONFLICT DO NOTHING` on the canonical pair; the unique constraint is
/// the only arbiter between concurrent callers.
fn insert_match(
    conn: &Connection,
    pair: CanonicalPair,
    created_at: DateTime<Utc>,
    stamp: &str,
) -> Result<MatchInsert> {
    let inserted = conn.execute(
        "INSERT INTO matches (party_a_id, party_b_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(party_a_id, party_b_id) DO NOTHING",
        params![pair.party_a().0, pair.party_b().0, stamp],
    )?;

    if inserted == 1 {
        let id = conn.last_insert_rowid();
        debug!("Created match {} for {}/{}", id, pair.party_a(), pair.party_b());
        return Ok(MatchInsert::Created(Match {
            id: MatchId(id),
            party_a_id: pair.party_a(),
            party_b_id: pair.party_b(),
            created_at,
        }));
    }

    let existing = query_match_for_pair(conn, pair)?.ok_or_else(|| {
        DbError::Corrupt(format!(
            "match insert for {}/{} ignored but no row found",
            pair.party_a(),
            pair.party_b()
        ))
    })?;
    Ok(MatchInsert::Existing(existing))
}

fn query_match_for_pair(conn: &Connection, pair: CanonicalPair) -> Result<Option<Match>> {
    let sql = format!(
        "SELECT {} FROM matches WHERE party_a_id = ?1 AND party_b_id = ?2",
        MATCH_COLUMNS
    );
    conn.query_row(&sql, params![pair.party_a().0, pair.party_b().0], match_row)
        .optional()?
        .map(Match::try_from)
        .transpose()
}

fn query_messages(
    conn: &Connection,
    match_id: MatchId,
    limit: u32,
    offset: u32,
) -> Result<Vec<Message>> {
    let sql = format!(
        "SELECT {} FROM messages WHERE match_id = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![match_id.0, limit, offset], message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(Message::try_from).collect()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
