use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS interests (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            actor_id    INTEGER NOT NULL,
            target_id   INTEGER NOT NULL,
            direction   TEXT NOT NULL CHECK (direction IN ('left', 'right')),
            created_at  TEXT NOT NULL,
            UNIQUE(actor_id, target_id),
            CHECK (actor_id <> target_id)
        );

        CREATE INDEX IF NOT EXISTS idx_interests_target
            ON interests(target_id, actor_id);

        -- party_a_id < party_b_id makes the pair constraint direction-independent
        CREATE TABLE IF NOT EXISTS matches (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            party_a_id  INTEGER NOT NULL,
            party_b_id  INTEGER NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(party_a_id, party_b_id),
            CHECK (party_a_id < party_b_id)
        );

        CREATE INDEX IF NOT EXISTS idx_matches_party_b
            ON matches(party_b_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            match_id        INTEGER NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
            sender_id       INTEGER NOT NULL,
            content         TEXT NOT NULL,
            message_type    TEXT NOT NULL DEFAULT 'text'
                            CHECK (message_type IN ('text', 'image', 'audio')),
            media_url       TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_match
            ON messages(match_id, id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
