use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS channels (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Shared id space for channel messages and DMs. Every id maps to
        -- exactly one envelope row in the table named by its kind.
        CREATE TABLE IF NOT EXISTS message_ids (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            kind        TEXT NOT NULL CHECK (kind IN ('message', 'direct_message'))
        );

        -- Immutable message body, decoupled from routing so reactions and
        -- attachments attach once regardless of envelope kind.
        CREATE TABLE IF NOT EXISTS message_contents (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            content     TEXT NOT NULL,
            author_id   TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY
                            REFERENCES message_ids(id) ON DELETE CASCADE,
            content_id  INTEGER NOT NULL UNIQUE
                            REFERENCES message_contents(id) ON DELETE CASCADE,
            channel_id  INTEGER NOT NULL
                            REFERENCES channels(id) ON DELETE CASCADE,
            parent_id   INTEGER
                            REFERENCES messages(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id);
        CREATE INDEX IF NOT EXISTS idx_messages_parent
            ON messages(parent_id);

        CREATE TABLE IF NOT EXISTS direct_messages (
            id            INTEGER PRIMARY KEY
                              REFERENCES message_ids(id) ON DELETE CASCADE,
            content_id    INTEGER NOT NULL UNIQUE
                              REFERENCES message_contents(id) ON DELETE CASCADE,
            participant1  TEXT NOT NULL,
            participant2  TEXT NOT NULL,
            parent_id     INTEGER
                              REFERENCES direct_messages(id) ON DELETE CASCADE,
            CHECK (participant1 <= participant2)
        );

        CREATE INDEX IF NOT EXISTS idx_dms_pair
            ON direct_messages(participant1, participant2);

        -- Reactions key off content so one lookup path serves both kinds.
        CREATE TABLE IF NOT EXISTS reactions (
            content_id  INTEGER NOT NULL
                            REFERENCES message_contents(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(content_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_content
            ON reactions(content_id);

        CREATE TABLE IF NOT EXISTS attachments (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            content_id    INTEGER NOT NULL
                              REFERENCES message_contents(id) ON DELETE CASCADE,
            storage_key   TEXT NOT NULL,
            filename      TEXT NOT NULL,
            content_type  TEXT NOT NULL,
            byte_size     INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_attachments_content
            ON attachments(content_id);

        -- Seed the default general channel
        INSERT OR IGNORE INTO channels (id, name)
            VALUES (1, 'general');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
