use anyhow::{Context, Result};
use rusqlite::{named_params, OptionalExtension, Row};
use uuid::Uuid;

use circle_types::{Group, GroupMember, GroupMessage};

use crate::db::rows::{flag_at, now, timestamp_at, uuid_at};
use crate::db::DbPool;

/// Group columns as seen by member `:me`, with unread count since their last read.
const GROUP_SELECT: &str = "SELECT g.id, g.name, g.description, g.creator_id, g.created_at,
            (SELECT COUNT(*) FROM group_members c WHERE c.group_id = g.id),
            (SELECT COUNT(*) FROM group_messages m
             WHERE m.group_id = g.id AND m.sender_id != :me
               AND m.created_at > COALESCE(me.last_read_at, me.joined_at))
     FROM chat_groups g
     JOIN group_members me ON me.group_id = g.id AND me.user_id = :me";

fn group_from_row(row: &Row) -> rusqlite::Result<Group> {
    Ok(Group {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        creator_id: uuid_at(row, 3)?,
        created_at: timestamp_at(row, 4)?,
        member_count: row.get(5)?,
        unread_count: row.get(6)?,
    })
}

fn group_message_from_row(row: &Row) -> rusqlite::Result<GroupMessage> {
    Ok(GroupMessage {
        id: uuid_at(row, 0)?,
        group_id: uuid_at(row, 1)?,
        sender_id: uuid_at(row, 2)?,
        sender_username: row.get(3)?,
        content: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

pub struct GroupRepository {
    pool: DbPool,
}

impl GroupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a group with its creator as admin. Unknown ids in `member_ids`
    /// and users with a block against the creator are skipped.
    ///
    /// # Returns
    /// * `(group_id, added)` - the new group and the members added besides the creator
    pub fn create(
        &self,
        creator_id: &Uuid,
        name: &str,
        description: Option<&str>,
        member_ids: &[Uuid],
    ) -> Result<(Uuid, Vec<Uuid>)> {
        let id = Uuid::new_v4();
        let stamp = now();
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO chat_groups (id, name, description, creator_id, created_at) VALUES (?, ?, ?, ?, ?)",
            (id.to_string(), name, description, creator_id.to_string(), &stamp),
        )
        .context("Failed to create group")?;
        tx.execute(
            "INSERT INTO group_members (group_id, user_id, is_admin, joined_at, last_read_at)
             VALUES (?, ?, 1, ?, ?)",
            (id.to_string(), creator_id.to_string(), &stamp, &stamp),
        )
        .context("Failed to add group creator")?;

        let mut added = Vec::new();
        for member_id in member_ids.iter().filter(|m| *m != creator_id) {
            let rows = tx
                .execute(
                    "INSERT OR IGNORE INTO group_members (group_id, user_id, is_admin, joined_at)
                     SELECT ?1, u.id, 0, ?2 FROM users u
                     WHERE u.id = ?3
                       AND NOT EXISTS (
                           SELECT 1 FROM followers b
                           WHERE b.status = 'blocked'
                             AND ((b.follower_id = ?3 AND b.followed_id = ?4)
                               OR (b.follower_id = ?4 AND b.followed_id = ?3)))",
                    (id.to_string(), &stamp, member_id.to_string(), creator_id.to_string()),
                )
                .context("Failed to add group member")?;
            if rows > 0 {
                added.push(*member_id);
            }
        }

        tx.commit()?;
        Ok((id, added))
    }

    /// Creator of a group, or `None` when the group does not exist
    pub fn creator_of(&self, group_id: &Uuid) -> Result<Option<Uuid>> {
        let conn = self.pool.get()?;
        let creator = conn
            .query_row(
                "SELECT creator_id FROM chat_groups WHERE id = ?",
                [group_id.to_string()],
                |row| uuid_at(row, 0),
            )
            .optional()?;
        Ok(creator)
    }

    /// Get a group as seen by one of its members
    pub fn get_for_member(&self, group_id: &Uuid, user_id: &Uuid) -> Result<Option<Group>> {
        let conn = self.pool.get()?;
        let group = conn
            .query_row(
                &format!("{} WHERE g.id = :id", GROUP_SELECT),
                named_params! { ":id": group_id.to_string(), ":me": user_id.to_string() },
                group_from_row,
            )
            .optional()?;
        Ok(group)
    }

    /// Groups `user_id` belongs to, newest first
    pub fn list_for_user(&self, user_id: &Uuid) -> Result<Vec<Group>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY g.created_at DESC", GROUP_SELECT))?;
        let groups = stmt
            .query_map(named_params! { ":me": user_id.to_string() }, group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    pub fn update(&self, group_id: &Uuid, name: &str, description: Option<&str>) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE chat_groups SET name = ?, description = ? WHERE id = ?",
            (name, description, group_id.to_string()),
        )
        .context("Failed to update group")?;
        Ok(())
    }

    /// Delete a group with its memberships and messages
    pub fn delete(&self, group_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute("DELETE FROM chat_groups WHERE id = ?", [group_id.to_string()])
            .context("Failed to delete group")?;
        Ok(rows)
    }

    /// `Some(is_admin)` when `user_id` is a member
    pub fn membership(&self, group_id: &Uuid, user_id: &Uuid) -> Result<Option<bool>> {
        let conn = self.pool.get()?;
        let role = conn
            .query_row(
                "SELECT is_admin FROM group_members WHERE group_id = ? AND user_id = ?",
                (group_id.to_string(), user_id.to_string()),
                |row| flag_at(row, 0),
            )
            .optional()?;
        Ok(role)
    }

    /// Admins first, then by join time
    pub fn members(&self, group_id: &Uuid) -> Result<Vec<GroupMember>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT gm.user_id, u.username, gm.is_admin, gm.joined_at
             FROM group_members gm
             JOIN users u ON u.id = gm.user_id
             WHERE gm.group_id = ?
             ORDER BY gm.is_admin DESC, gm.joined_at ASC",
        )?;
        let members = stmt
            .query_map([group_id.to_string()], |row| {
                Ok(GroupMember {
                    user_id: uuid_at(row, 0)?,
                    username: row.get(1)?,
                    is_admin: flag_at(row, 2)?,
                    joined_at: timestamp_at(row, 3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    /// Add a member; `false` when they already belong to the group
    pub fn add_member(&self, group_id: &Uuid, user_id: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id, is_admin, joined_at)
                 VALUES (?, ?, 0, ?)",
                (group_id.to_string(), user_id.to_string(), now()),
            )
            .context("Failed to add group member")?;
        Ok(rows > 0)
    }

    pub fn remove_member(&self, group_id: &Uuid, user_id: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "DELETE FROM group_members WHERE group_id = ? AND user_id = ?",
                (group_id.to_string(), user_id.to_string()),
            )
            .context("Failed to remove group member")?;
        Ok(rows > 0)
    }

    pub fn set_admin(&self, group_id: &Uuid, user_id: &Uuid, is_admin: bool) -> Result<bool> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "UPDATE group_members SET is_admin = ? WHERE group_id = ? AND user_id = ?",
                (is_admin as i64, group_id.to_string(), user_id.to_string()),
            )
            .context("Failed to update member role")?;
        Ok(rows > 0)
    }

    /// Post a message; the sender's read marker moves past it
    pub fn send_message(&self, group_id: &Uuid, sender_id: &Uuid, content: &str) -> Result<GroupMessage> {
        let id = Uuid::new_v4();
        let stamp = now();
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO group_messages (id, group_id, sender_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
            (id.to_string(), group_id.to_string(), sender_id.to_string(), content, &stamp),
        )
        .context("Failed to send group message")?;
        tx.execute(
            "UPDATE group_members SET last_read_at = ? WHERE group_id = ? AND user_id = ?",
            (&stamp, group_id.to_string(), sender_id.to_string()),
        )
        .context("Failed to update read marker")?;
        let sender_username: String = tx.query_row(
            "SELECT username FROM users WHERE id = ?",
            [sender_id.to_string()],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok(GroupMessage {
            id,
            group_id: *group_id,
            sender_id: *sender_id,
            sender_username,
            content: content.to_string(),
            created_at: stamp.parse()?,
        })
    }

    /// The latest messages of a group, returned oldest first
    pub fn messages(&self, group_id: &Uuid, limit: i64, offset: i64) -> Result<Vec<GroupMessage>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM (
                SELECT m.id, m.group_id, m.sender_id, u.username, m.content, m.created_at, m.rowid AS seq
                FROM group_messages m
                JOIN users u ON u.id = m.sender_id
                WHERE m.group_id = ?
                ORDER BY m.created_at DESC, m.rowid DESC
                LIMIT ? OFFSET ?
             ) ORDER BY created_at ASC, seq ASC",
        )?;
        let messages = stmt
            .query_map((group_id.to_string(), limit, offset), group_message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// Move a member's read marker to now
    pub fn mark_read(&self, group_id: &Uuid, user_id: &Uuid) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE group_members SET last_read_at = ? WHERE group_id = ? AND user_id = ?",
            (now(), group_id.to_string(), user_id.to_string()),
        )
        .context("Failed to mark group as read")?;
        Ok(())
    }
}
