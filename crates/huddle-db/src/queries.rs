use anyhow::Result;
use rusqlite::{Connection, Transaction, params};

use crate::Database;
use crate::models::{
    AttachmentRow, ChannelRow, Envelope, HistoryRow, MessageKind, NewAttachment, ReactionRow,
    StoredMessage, UserRow,
};

impl Database {
    // -- Users --

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, username, created_at FROM users WHERE id = ?1")?;
            let row = stmt
                .query_row([id], |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    /// Insert a new local user record. Returns false when the username is taken.
    pub fn create_user(&self, id: &str, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            match conn.execute(
                "INSERT INTO users (id, username) VALUES (?1, ?2)",
                params![id, username],
            ) {
                Ok(_) => Ok(true),
                Err(e) if is_unique_violation(&e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Rename a user. Returns false when the new name is taken.
    pub fn rename_user(&self, id: &str, new_username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            match conn.execute(
                "UPDATE users SET username = ?2 WHERE id = ?1",
                params![id, new_username],
            ) {
                Ok(_) => Ok(true),
                Err(e) if is_unique_violation(&e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    // -- Channels --

    pub fn list_channels(&self) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM channels ORDER BY name ASC")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(ChannelRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn channel_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM channels WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(exists.is_some())
        })
    }

    /// Insert a channel. Returns None when the name is already taken.
    pub fn add_channel(&self, name: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            match conn.execute("INSERT INTO channels (name) VALUES (?1)", [name]) {
                Ok(_) => Ok(Some(conn.last_insert_rowid())),
                Err(e) if is_unique_violation(&e) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Delete a channel and everything hanging off it: messages, their shared
    /// ids, contents, and (by cascade from content) reactions and attachments.
    /// Returns false when the channel does not exist.
    pub fn remove_channel(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            // Deleting contents cascades envelopes, reactions, and attachments.
            tx.execute(
                "DELETE FROM message_contents WHERE id IN
                   (SELECT content_id FROM messages WHERE channel_id = ?1)",
                [id],
            )?;
            // Shared ids left orphaned by the cascade above.
            tx.execute(
                "DELETE FROM message_ids WHERE kind = 'message'
                   AND id NOT IN (SELECT id FROM messages)",
                [],
            )?;
            let deleted = tx.execute("DELETE FROM channels WHERE id = ?1", [id])?;

            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    // -- Messages --

    /// Channel a parent message belongs to, if the parent exists.
    pub fn parent_channel(&self, parent_id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let channel: Option<i64> = conn
                .query_row(
                    "SELECT channel_id FROM messages WHERE id = ?1",
                    [parent_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(channel)
        })
    }

    /// Participant pair of a parent DM, if the parent exists.
    pub fn parent_dm_pair(&self, parent_id: i64) -> Result<Option<(String, String)>> {
        self.with_conn(|conn| {
            let pair = conn
                .query_row(
                    "SELECT participant1, participant2 FROM direct_messages WHERE id = ?1",
                    [parent_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(pair)
        })
    }

    /// Persist a channel message: shared id, content, attachments, envelope,
    /// one transaction, so no reader ever observes a partial sequence.
    pub fn insert_channel_message(
        &self,
        channel_id: i64,
        author_id: &str,
        content: &str,
        parent_id: Option<i64>,
        attachments: &[NewAttachment],
    ) -> Result<StoredMessage> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let (id, content_id, created_at) =
                insert_id_and_content(&tx, MessageKind::Message, author_id, content, attachments)?;

            tx.execute(
                "INSERT INTO messages (id, content_id, channel_id, parent_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, content_id, channel_id, parent_id],
            )?;

            tx.commit()?;
            Ok(StoredMessage {
                id,
                content_id,
                created_at,
            })
        })
    }

    /// Persist a DM. `participant1`/`participant2` must already be canonical.
    pub fn insert_direct_message(
        &self,
        participant1: &str,
        participant2: &str,
        author_id: &str,
        content: &str,
        parent_id: Option<i64>,
        attachments: &[NewAttachment],
    ) -> Result<StoredMessage> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let (id, content_id, created_at) = insert_id_and_content(
                &tx,
                MessageKind::DirectMessage,
                author_id,
                content,
                attachments,
            )?;

            tx.execute(
                "INSERT INTO direct_messages (id, content_id, participant1, participant2, parent_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, content_id, participant1, participant2, parent_id],
            )?;

            tx.commit()?;
            Ok(StoredMessage {
                id,
                content_id,
                created_at,
            })
        })
    }

    /// Resolve a shared message id to its envelope. Every component that needs
    /// kind-dispatch (reactions, thread lookups) goes through here.
    pub fn resolve_envelope(&self, id: i64) -> Result<Option<Envelope>> {
        self.with_conn(|conn| {
            let kind: Option<String> = conn
                .query_row("SELECT kind FROM message_ids WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;

            let envelope = match kind.as_deref() {
                Some("message") => conn
                    .query_row(
                        "SELECT content_id, channel_id, parent_id FROM messages WHERE id = ?1",
                        [id],
                        |row| {
                            Ok(Envelope::Channel {
                                id,
                                content_id: row.get(0)?,
                                channel_id: row.get(1)?,
                                parent_id: row.get(2)?,
                            })
                        },
                    )
                    .optional()?,
                Some("direct_message") => conn
                    .query_row(
                        "SELECT content_id, participant1, participant2, parent_id
                         FROM direct_messages WHERE id = ?1",
                        [id],
                        |row| {
                            Ok(Envelope::Direct {
                                id,
                                content_id: row.get(0)?,
                                participant1: row.get(1)?,
                                participant2: row.get(2)?,
                                parent_id: row.get(3)?,
                            })
                        },
                    )
                    .optional()?,
                _ => None,
            };

            Ok(envelope)
        })
    }

    // -- Reactions --

    /// Toggle a (content, user, emoji) reaction inside one transaction:
    /// delete if present, insert otherwise. Concurrent identical toggles
    /// serialize on the connection, so a pair always nets out to a no-op.
    /// Returns true when the toggle added the reaction.
    pub fn toggle_reaction(&self, content_id: i64, user_id: &str, emoji: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let deleted = tx.execute(
                "DELETE FROM reactions WHERE content_id = ?1 AND user_id = ?2 AND emoji = ?3",
                params![content_id, user_id, emoji],
            )?;

            let added = deleted == 0;
            if added {
                tx.execute(
                    "INSERT INTO reactions (content_id, user_id, emoji) VALUES (?1, ?2, ?3)",
                    params![content_id, user_id, emoji],
                )?;
            }

            tx.commit()?;
            Ok(added)
        })
    }

    /// Full (emoji, user) set for one content row.
    pub fn reactions_for_content(&self, content_id: i64) -> Result<Vec<ReactionRow>> {
        self.reactions_for_contents(&[content_id])
    }

    /// Batch-fetch reactions for a set of content ids.
    pub fn reactions_for_contents(&self, content_ids: &[i64]) -> Result<Vec<ReactionRow>> {
        if content_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=content_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT content_id, user_id, emoji FROM reactions
                 WHERE content_id IN ({}) ORDER BY created_at ASC, rowid ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = content_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReactionRow {
                        content_id: row.get(0)?,
                        user_id: row.get(1)?,
                        emoji: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Attachments --

    pub fn attachments_for_contents(&self, content_ids: &[i64]) -> Result<Vec<AttachmentRow>> {
        if content_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=content_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT content_id, storage_key, filename, content_type, byte_size
                 FROM attachments WHERE content_id IN ({}) ORDER BY id ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = content_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(AttachmentRow {
                        content_id: row.get(0)?,
                        storage_key: row.get(1)?,
                        filename: row.get(2)?,
                        content_type: row.get(3)?,
                        byte_size: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- History --

    /// Full history of a channel (top-level messages and thread replies),
    /// creation time ascending with the envelope id as deterministic tie-break.
    pub fn channel_history(&self, channel_id: i64) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            query_history(
                conn,
                "SELECT m.id, m.content_id, c.content, c.author_id,
                        COALESCE(u.username, 'unknown'), c.created_at, m.parent_id
                 FROM messages m
                 JOIN message_contents c ON m.content_id = c.id
                 LEFT JOIN users u ON c.author_id = u.id
                 WHERE m.channel_id = ?1
                 ORDER BY c.created_at ASC, m.id ASC",
                params![channel_id],
            )
        })
    }

    pub fn dm_history(&self, participant1: &str, participant2: &str) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            query_history(
                conn,
                "SELECT m.id, m.content_id, c.content, c.author_id,
                        COALESCE(u.username, 'unknown'), c.created_at, m.parent_id
                 FROM direct_messages m
                 JOIN message_contents c ON m.content_id = c.id
                 LEFT JOIN users u ON c.author_id = u.id
                 WHERE m.participant1 = ?1 AND m.participant2 = ?2
                 ORDER BY c.created_at ASC, m.id ASC",
                params![participant1, participant2],
            )
        })
    }

    /// Replies whose parent is the given channel message.
    pub fn thread_history(&self, channel_id: i64, parent_id: i64) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            query_history(
                conn,
                "SELECT m.id, m.content_id, c.content, c.author_id,
                        COALESCE(u.username, 'unknown'), c.created_at, m.parent_id
                 FROM messages m
                 JOIN message_contents c ON m.content_id = c.id
                 LEFT JOIN users u ON c.author_id = u.id
                 WHERE m.channel_id = ?1 AND m.parent_id = ?2
                 ORDER BY c.created_at ASC, m.id ASC",
                params![channel_id, parent_id],
            )
        })
    }

    pub fn dm_thread_history(
        &self,
        participant1: &str,
        participant2: &str,
        parent_id: i64,
    ) -> Result<Vec<HistoryRow>> {
        self.with_conn(|conn| {
            query_history(
                conn,
                "SELECT m.id, m.content_id, c.content, c.author_id,
                        COALESCE(u.username, 'unknown'), c.created_at, m.parent_id
                 FROM direct_messages m
                 JOIN message_contents c ON m.content_id = c.id
                 LEFT JOIN users u ON c.author_id = u.id
                 WHERE m.participant1 = ?1 AND m.participant2 = ?2 AND m.parent_id = ?3
                 ORDER BY c.created_at ASC, m.id ASC",
                params![participant1, participant2, parent_id],
            )
        })
    }
}

/// Shared leg of both envelope inserts: shared id, content row, attachments.
fn insert_id_and_content(
    tx: &Transaction<'_>,
    kind: MessageKind,
    author_id: &str,
    content: &str,
    attachments: &[NewAttachment],
) -> Result<(i64, i64, String)> {
    tx.execute(
        "INSERT INTO message_ids (kind) VALUES (?1)",
        [kind.as_str()],
    )?;
    let id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO message_contents (content, author_id) VALUES (?1, ?2)",
        params![content, author_id],
    )?;
    let content_id = tx.last_insert_rowid();

    for a in attachments {
        tx.execute(
            "INSERT INTO attachments (content_id, storage_key, filename, content_type, byte_size)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![content_id, a.storage_key, a.filename, a.content_type, a.byte_size],
        )?;
    }

    let created_at: String = tx.query_row(
        "SELECT created_at FROM message_contents WHERE id = ?1",
        [content_id],
        |row| row.get(0),
    )?;

    Ok((id, content_id, created_at))
}

fn query_history(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<HistoryRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(HistoryRow {
                id: row.get(0)?,
                content_id: row.get(1)?,
                content: row.get(2)?,
                author_id: row.get(3)?,
                username: row.get(4)?,
                created_at: row.get(5)?,
                parent_id: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
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

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u-alice", "alice").unwrap();
        db.create_user("u-bob", "bob").unwrap();
        db
    }

    #[test]
    fn message_id_kind_matches_envelope_table() {
        let db = db();

        let msg = db
            .insert_channel_message(1, "u-alice", "hello", None, &[])
            .unwrap();
        let dm = db
            .insert_direct_message("u-alice", "u-bob", "u-alice", "psst", None, &[])
            .unwrap();

        match db.resolve_envelope(msg.id).unwrap().unwrap() {
            Envelope::Channel { channel_id, .. } => assert_eq!(channel_id, 1),
            other => panic!("expected channel envelope, got {other:?}"),
        }
        match db.resolve_envelope(dm.id).unwrap().unwrap() {
            Envelope::Direct {
                participant1,
                participant2,
                ..
            } => {
                assert_eq!(participant1, "u-alice");
                assert_eq!(participant2, "u-bob");
            }
            other => panic!("expected direct envelope, got {other:?}"),
        }

        // Ids come from one shared space.
        assert_ne!(msg.id, dm.id);
        assert!(db.resolve_envelope(9999).unwrap().is_none());
    }

    #[test]
    fn toggle_reaction_pair_is_idempotent() {
        let db = db();
        let msg = db
            .insert_channel_message(1, "u-alice", "hello", None, &[])
            .unwrap();

        assert!(db.toggle_reaction(msg.content_id, "u-bob", "👍").unwrap());
        assert_eq!(db.reactions_for_content(msg.content_id).unwrap().len(), 1);

        assert!(!db.toggle_reaction(msg.content_id, "u-bob", "👍").unwrap());
        assert!(db.reactions_for_content(msg.content_id).unwrap().is_empty());

        // Third toggle restores exactly one pair.
        assert!(db.toggle_reaction(msg.content_id, "u-bob", "👍").unwrap());
        let reactions = db.reactions_for_content(msg.content_id).unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].user_id, "u-bob");
    }

    #[test]
    fn simultaneous_identical_toggles_serialize_to_one_net_state() {
        use std::sync::Arc;

        let db = Arc::new(db());
        let msg = db
            .insert_channel_message(1, "u-alice", "hello", None, &[])
            .unwrap();
        let content_id = msg.content_id;

        // Two threads race the same (content, user, emoji) toggle. The
        // transactions serialize on the connection, so exactly one adds and
        // the other removes, whichever order they land in.
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || db.toggle_reaction(content_id, "u-bob", "👍").unwrap())
            })
            .collect();
        let mut added: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        added.sort();

        assert_eq!(added, vec![false, true]);
        assert!(db.reactions_for_content(content_id).unwrap().is_empty());

        // The next toggle lands on the settled state.
        assert!(db.toggle_reaction(content_id, "u-bob", "👍").unwrap());
        assert_eq!(db.reactions_for_content(content_id).unwrap().len(), 1);
    }

    #[test]
    fn distinct_emoji_coexist_on_one_message() {
        let db = db();
        let msg = db
            .insert_channel_message(1, "u-alice", "hello", None, &[])
            .unwrap();

        db.toggle_reaction(msg.content_id, "u-bob", "👍").unwrap();
        db.toggle_reaction(msg.content_id, "u-bob", "🎉").unwrap();
        db.toggle_reaction(msg.content_id, "u-alice", "👍").unwrap();

        assert_eq!(db.reactions_for_content(msg.content_id).unwrap().len(), 3);
    }

    #[test]
    fn remove_channel_cascades_to_reactions_and_attachments() {
        let db = db();
        let channel = db.add_channel("standup").unwrap().unwrap();

        let attachments = [NewAttachment {
            storage_key: "objects/1".into(),
            filename: "notes.pdf".into(),
            content_type: "application/pdf".into(),
            byte_size: 1024,
        }];
        let msg = db
            .insert_channel_message(channel, "u-alice", "hello", None, &attachments)
            .unwrap();
        db.insert_channel_message(channel, "u-bob", "reply", Some(msg.id), &[])
            .unwrap();
        db.toggle_reaction(msg.content_id, "u-bob", "👍").unwrap();

        assert!(db.remove_channel(channel).unwrap());

        assert!(db.channel_history(channel).unwrap().is_empty());
        assert!(db.resolve_envelope(msg.id).unwrap().is_none());
        assert!(db.reactions_for_content(msg.content_id).unwrap().is_empty());
        assert!(
            db.attachments_for_contents(&[msg.content_id])
                .unwrap()
                .is_empty()
        );

        // Unrelated data survives.
        let other = db
            .insert_channel_message(1, "u-alice", "still here", None, &[])
            .unwrap();
        assert!(db.resolve_envelope(other.id).unwrap().is_some());
        assert!(!db.remove_channel(channel).unwrap());
    }

    #[test]
    fn history_is_ordered_and_complete() {
        let db = db();
        let first = db
            .insert_channel_message(1, "u-alice", "first", None, &[])
            .unwrap();
        let second = db
            .insert_channel_message(1, "u-bob", "second", None, &[])
            .unwrap();
        let reply = db
            .insert_channel_message(1, "u-bob", "reply", Some(first.id), &[])
            .unwrap();

        let history = db.channel_history(1).unwrap();
        let ids: Vec<i64> = history.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first.id, second.id, reply.id]);
        assert_eq!(history[0].username, "alice");

        let thread = db.thread_history(1, first.id).unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].id, reply.id);
        assert_eq!(thread[0].parent_id, Some(first.id));
    }

    #[test]
    fn dm_history_is_scoped_to_the_pair() {
        let db = db();
        db.create_user("u-carol", "carol").unwrap();

        let dm = db
            .insert_direct_message("u-alice", "u-bob", "u-alice", "hey bob", None, &[])
            .unwrap();
        db.insert_direct_message("u-alice", "u-carol", "u-alice", "hey carol", None, &[])
            .unwrap();
        db.insert_direct_message("u-alice", "u-bob", "u-bob", "in thread", Some(dm.id), &[])
            .unwrap();

        let history = db.dm_history("u-alice", "u-bob").unwrap();
        assert_eq!(history.len(), 2);

        let thread = db.dm_thread_history("u-alice", "u-bob", dm.id).unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].content, "in thread");

        assert_eq!(db.parent_dm_pair(dm.id).unwrap().unwrap().0, "u-alice");
        assert!(db.parent_dm_pair(9999).unwrap().is_none());
    }

    #[test]
    fn parent_channel_lookup() {
        let db = db();
        let msg = db
            .insert_channel_message(1, "u-alice", "hello", None, &[])
            .unwrap();
        assert_eq!(db.parent_channel(msg.id).unwrap(), Some(1));
        assert_eq!(db.parent_channel(9999).unwrap(), None);
    }

    #[test]
    fn duplicate_names_are_reported_not_raised() {
        let db = db();
        assert!(db.add_channel("design").unwrap().is_some());
        assert!(db.add_channel("design").unwrap().is_none());

        assert!(!db.create_user("u-carol", "alice").unwrap());
        assert!(db.create_user("u-carol", "carol").unwrap());

        assert!(!db.rename_user("u-carol", "bob").unwrap());
        assert!(db.rename_user("u-carol", "caroline").unwrap());
        assert_eq!(
            db.get_user_by_id("u-carol").unwrap().unwrap().username,
            "caroline"
        );
    }

    #[test]
    fn channels_list_ordered_by_name() {
        let db = db();
        db.add_channel("zulip-refugees").unwrap();
        db.add_channel("announcements").unwrap();

        let names: Vec<String> = db
            .list_channels()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["announcements", "general", "zulip-refugees"]);
    }

    #[test]
    fn attachments_persist_with_the_message() {
        let db = db();
        let attachments = [
            NewAttachment {
                storage_key: "objects/a".into(),
                filename: "a.png".into(),
                content_type: "image/png".into(),
                byte_size: 10,
            },
            NewAttachment {
                storage_key: "objects/b".into(),
                filename: "b.txt".into(),
                content_type: "text/plain".into(),
                byte_size: 20,
            },
        ];
        let msg = db
            .insert_channel_message(1, "u-alice", "with files", None, &attachments)
            .unwrap();

        let rows = db.attachments_for_contents(&[msg.content_id]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].storage_key, "objects/a");
        assert_eq!(rows[1].byte_size, 20);
    }
}
