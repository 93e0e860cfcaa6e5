use anyhow::{Context, Result};
use rusqlite::{named_params, OptionalExtension, Row};
use uuid::Uuid;

use circle_types::{Conversation, DirectMessage};

use crate::db::rows::{flag_at, now, timestamp_at, uuid_at};
use crate::db::DbPool;

const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id, m.receiver_id, u.username, m.content, m.is_read, m.created_at,
            m.rowid AS seq
     FROM messages m
     JOIN users u ON u.id = m.sender_id";

fn message_from_row(row: &Row) -> rusqlite::Result<DirectMessage> {
    Ok(DirectMessage {
        id: uuid_at(row, 0)?,
        sender_id: uuid_at(row, 1)?,
        receiver_id: uuid_at(row, 2)?,
        sender_username: row.get(3)?,
        content: row.get(4)?,
        is_read: flag_at(row, 5)?,
        created_at: timestamp_at(row, 6)?,
    })
}

pub struct MessageRepository {
    pool: DbPool,
}

impl MessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new direct message
    pub fn send(&self, sender_id: &Uuid, receiver_id: &Uuid, content: &str) -> Result<DirectMessage> {
        let id = Uuid::new_v4();
        {
            let conn = self.pool.get()?;
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, is_read, created_at)
                 VALUES (?, ?, ?, ?, 0, ?)",
                (
                    id.to_string(),
                    sender_id.to_string(),
                    receiver_id.to_string(),
                    content,
                    now(),
                ),
            )
            .context("Failed to create direct message")?;
        }
        self.get(&id)?
            .context("Direct message missing after insert")
    }

    pub fn get(&self, message_id: &Uuid) -> Result<Option<DirectMessage>> {
        let conn = self.pool.get()?;
        let message = conn
            .query_row(
                &format!("{} WHERE m.id = ?", MESSAGE_SELECT),
                [message_id.to_string()],
                message_from_row,
            )
            .optional()?;
        Ok(message)
    }

    /// Messages exchanged between two users, oldest first
    pub fn conversation(
        &self,
        user_id: &Uuid,
        other_id: &Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DirectMessage>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM (
                {} WHERE (m.sender_id = :me AND m.receiver_id = :other)
                      OR (m.sender_id = :other AND m.receiver_id = :me)
                ORDER BY m.created_at DESC, m.rowid DESC
                LIMIT :limit OFFSET :offset
             ) ORDER BY created_at ASC, seq ASC",
            MESSAGE_SELECT
        ))?;

        let messages = stmt
            .query_map(
                named_params! {
                    ":me": user_id.to_string(),
                    ":other": other_id.to_string(),
                    ":limit": limit,
                    ":offset": offset,
                },
                message_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// One entry per conversation partner, most recent conversation first
    pub fn conversations(&self, user_id: &Uuid) -> Result<Vec<Conversation>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "WITH threads AS (
                SELECT CASE WHEN sender_id = :me THEN receiver_id ELSE sender_id END AS other_id,
                       content, created_at, rowid AS seq
                FROM messages
                WHERE sender_id = :me OR receiver_id = :me
             ),
             latest AS (
                SELECT other_id, MAX(created_at) AS last_at FROM threads GROUP BY other_id
             )
             SELECT l.other_id, u.username,
                    (SELECT t.content FROM threads t WHERE t.other_id = l.other_id
                     ORDER BY t.created_at DESC, t.seq DESC LIMIT 1),
                    l.last_at,
                    (SELECT COUNT(*) FROM messages m
                     WHERE m.sender_id = l.other_id AND m.receiver_id = :me AND m.is_read = 0)
             FROM latest l
             JOIN users u ON u.id = l.other_id
             ORDER BY l.last_at DESC",
        )?;

        let conversations = stmt
            .query_map(named_params! { ":me": user_id.to_string() }, |row| {
                Ok(Conversation {
                    other_user_id: uuid_at(row, 0)?,
                    other_username: row.get(1)?,
                    last_message: row.get(2)?,
                    last_message_at: timestamp_at(row, 3)?,
                    unread_count: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conversations)
    }

    /// Mark everything `other_id` sent to `user_id` as read
    pub fn mark_read(&self, user_id: &Uuid, other_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "UPDATE messages SET is_read = 1 WHERE receiver_id = ? AND sender_id = ? AND is_read = 0",
                (user_id.to_string(), other_id.to_string()),
            )
            .context("Failed to mark messages as read")?;
        Ok(rows)
    }

    /// Get unread message count for a user
    pub fn unread_count(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE receiver_id = ? AND is_read = 0",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn delete(&self, message_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute("DELETE FROM messages WHERE id = ?", [message_id.to_string()])
            .context("Failed to delete message")?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{create_user, test_db};

    #[test]
    fn test_send_and_read_conversation() {
        let db = test_db();
        let repo = MessageRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let first = repo.send(&alice.id, &bob.id, "hi bob").unwrap();
        assert_eq!(first.sender_username, "alice");
        assert!(!first.is_read);
        repo.send(&bob.id, &alice.id, "hi alice").unwrap();

        let thread = repo.conversation(&bob.id, &alice.id, 50, 0).unwrap();
        let contents: Vec<&str> = thread.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi bob", "hi alice"]);
    }

    #[test]
    fn test_conversations_and_unread_counts() {
        let db = test_db();
        let repo = MessageRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");
        let carol = create_user(&db, "carol");

        repo.send(&bob.id, &alice.id, "one").unwrap();
        repo.send(&bob.id, &alice.id, "two").unwrap();
        repo.send(&alice.id, &carol.id, "hey carol").unwrap();

        assert_eq!(repo.unread_count(&alice.id).unwrap(), 2);

        let conversations = repo.conversations(&alice.id).unwrap();
        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].other_username, "carol");
        assert_eq!(conversations[0].unread_count, 0);
        assert_eq!(conversations[1].last_message, "two");
        assert_eq!(conversations[1].unread_count, 2);

        assert_eq!(repo.mark_read(&alice.id, &bob.id).unwrap(), 2);
        assert_eq!(repo.unread_count(&alice.id).unwrap(), 0);
        // bob's view of the same thread is unaffected
        assert_eq!(repo.unread_count(&bob.id).unwrap(), 0);
    }

    #[test]
    fn test_delete_message() {
        let db = test_db();
        let repo = MessageRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let message = repo.send(&alice.id, &bob.id, "oops").unwrap();
        assert_eq!(repo.delete(&message.id).unwrap(), 1);
        assert!(repo.get(&message.id).unwrap().is_none());
        assert!(repo.conversation(&alice.id, &bob.id, 50, 0).unwrap().is_empty());
    }
}
