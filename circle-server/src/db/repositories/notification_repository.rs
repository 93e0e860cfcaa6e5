use anyhow::{Context, Result};
use rusqlite::Row;
use uuid::Uuid;

use circle_types::{Notification, NotificationKind};

use crate::db::rows::{enum_at, flag_at, now, opt_uuid_at, timestamp_at, uuid_at};
use crate::db::DbPool;

fn notification_from_row(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        actor_id: opt_uuid_at(row, 2)?,
        actor_username: row.get(3)?,
        kind: enum_at(row, 4, NotificationKind::parse)?,
        content: row.get(5)?,
        is_read: flag_at(row, 6)?,
        created_at: timestamp_at(row, 7)?,
    })
}

pub struct NotificationRepository {
    pool: DbPool,
}

impl NotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(
        &self,
        user_id: &Uuid,
        actor_id: Option<&Uuid>,
        kind: NotificationKind,
        content: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO notifications (id, user_id, actor_id, kind, content, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)",
            (
                id.to_string(),
                user_id.to_string(),
                actor_id.map(|a| a.to_string()),
                kind.as_str(),
                content,
                now(),
            ),
        )
        .context("Failed to create notification")?;
        Ok(id)
    }

    /// Newest first
    pub fn list(&self, user_id: &Uuid, limit: i64, offset: i64) -> Result<Vec<Notification>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT n.id, n.user_id, n.actor_id, a.username, n.kind, n.content, n.is_read, n.created_at
             FROM notifications n
             LEFT JOIN users a ON a.id = n.actor_id
             WHERE n.user_id = ?
             ORDER BY n.created_at DESC, n.rowid DESC
             LIMIT ? OFFSET ?",
        )?;
        let notifications = stmt
            .query_map((user_id.to_string(), limit, offset), notification_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    pub fn unread_count(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark one of the user's notifications read; `false` if it is not theirs
    pub fn mark_read(&self, notification_id: &Uuid, user_id: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?",
                (notification_id.to_string(), user_id.to_string()),
            )
            .context("Failed to mark notification as read")?;
        Ok(rows > 0)
    }

    pub fn mark_all_read(&self, user_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
                [user_id.to_string()],
            )
            .context("Failed to mark notifications as read")?;
        Ok(rows)
    }

    pub fn delete(&self, notification_id: &Uuid, user_id: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "DELETE FROM notifications WHERE id = ? AND user_id = ?",
                (notification_id.to_string(), user_id.to_string()),
            )
            .context("Failed to delete notification")?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::UserRepository;
    use crate::db::testing::{create_user, test_db};

    #[test]
    fn test_create_list_and_read() {
        let db = test_db();
        let repo = NotificationRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        repo.create(&alice.id, Some(&bob.id), NotificationKind::Follow, "bob followed you")
            .unwrap();
        let second = repo
            .create(&alice.id, None, NotificationKind::Support, "Your ticket was answered")
            .unwrap();

        let list = repo.list(&alice.id, 20, 0).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second);
        assert_eq!(list[1].actor_username.as_deref(), Some("bob"));
        assert_eq!(list[1].kind, NotificationKind::Follow);
        assert_eq!(repo.unread_count(&alice.id).unwrap(), 2);

        assert!(!repo.mark_read(&second, &bob.id).unwrap(), "not bob's notification");
        assert!(repo.mark_read(&second, &alice.id).unwrap());
        assert_eq!(repo.unread_count(&alice.id).unwrap(), 1);
        assert_eq!(repo.mark_all_read(&alice.id).unwrap(), 1);
        assert_eq!(repo.unread_count(&alice.id).unwrap(), 0);

        assert!(repo.delete(&second, &alice.id).unwrap());
        assert_eq!(repo.list(&alice.id, 20, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_deleting_actor_keeps_notification() {
        let db = test_db();
        let repo = NotificationRepository::new(db.pool.clone());
        let users = UserRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        repo.create(&alice.id, Some(&bob.id), NotificationKind::Like, "bob liked your post")
            .unwrap();
        users.delete(&bob.id).unwrap();

        let list = repo.list(&alice.id, 20, 0).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].actor_id, None);
        assert_eq!(list[0].actor_username, None);
    }
}
