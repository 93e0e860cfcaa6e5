use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use circle_types::{Comment, ContentKind};

use crate::db::rows::{now, timestamp_at, uuid_at};
use crate::db::DbPool;

/// A per-user toggle on a post or reel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    Like,
    Save,
    Share,
}

impl Engagement {
    fn table(self, kind: ContentKind) -> &'static str {
        match (kind, self) {
            (ContentKind::Post, Engagement::Like) => "post_likes",
            (ContentKind::Post, Engagement::Save) => "post_saves",
            (ContentKind::Post, Engagement::Share) => "post_shares",
            (ContentKind::Reel, Engagement::Like) => "reel_likes",
            (ContentKind::Reel, Engagement::Save) => "reel_saves",
            (ContentKind::Reel, Engagement::Share) => "reel_shares",
        }
    }

    fn counter(self) -> &'static str {
        match self {
            Engagement::Like => "likes_count",
            Engagement::Save => "saves_count",
            Engagement::Share => "shares_count",
        }
    }
}

/// Table names for one kind of content
struct ContentTables {
    content: &'static str,
    key: &'static str,
    comments: &'static str,
}

fn tables(kind: ContentKind) -> ContentTables {
    match kind {
        ContentKind::Post => ContentTables {
            content: "posts",
            key: "post_id",
            comments: "post_comments",
        },
        ContentKind::Reel => ContentTables {
            content: "reels",
            key: "reel_id",
            comments: "reel_comments",
        },
    }
}

fn comment_from_row(kind: ContentKind, row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: uuid_at(row, 0)?,
        content_kind: kind,
        content_id: uuid_at(row, 1)?,
        author_id: uuid_at(row, 2)?,
        author_username: row.get(3)?,
        content: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
    })
}

/// Likes, saves, shares and comments on posts and reels
pub struct EngagementRepository {
    pool: DbPool,
}

impl EngagementRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Flip `user_id`'s like/save/share on a piece of content.
    ///
    /// # Returns
    /// * `(active, count)` - state after the toggle and the refreshed counter
    pub fn toggle(
        &self,
        kind: ContentKind,
        engagement: Engagement,
        content_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(bool, i64)> {
        let t = tables(kind);
        let join_table = engagement.table(kind);
        let (content, user) = (content_id.to_string(), user_id.to_string());

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let removed = tx
            .execute(
                &format!("DELETE FROM {} WHERE {} = ? AND user_id = ?", join_table, t.key),
                (&content, &user),
            )
            .context("Failed to remove engagement")?;
        let active = removed == 0;
        if active {
            tx.execute(
                &format!(
                    "INSERT INTO {} ({}, user_id, created_at) VALUES (?, ?, ?)",
                    join_table, t.key
                ),
                (&content, &user, now()),
            )
            .context("Failed to record engagement")?;
        }

        // Recalculate the counter from the join table
        tx.execute(
            &format!(
                "UPDATE {content} SET {counter} = (SELECT COUNT(*) FROM {join} WHERE {key} = ?1) WHERE id = ?1",
                content = t.content,
                counter = engagement.counter(),
                join = join_table,
                key = t.key
            ),
            [&content],
        )
        .context("Failed to update engagement counter")?;
        let count: i64 = tx.query_row(
            &format!("SELECT {} FROM {} WHERE id = ?", engagement.counter(), t.content),
            [&content],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok((active, count))
    }

    /// Whether `user_id` currently has the engagement on the content
    pub fn is_active(
        &self,
        kind: ContentKind,
        engagement: Engagement,
        content_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ? AND user_id = ?",
                engagement.table(kind),
                tables(kind).key
            ),
            (content_id.to_string(), user_id.to_string()),
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Add a comment and refresh the content's comment counter
    pub fn add_comment(
        &self,
        kind: ContentKind,
        content_id: &Uuid,
        author_id: &Uuid,
        text: &str,
    ) -> Result<Comment> {
        let t = tables(kind);
        let id = Uuid::new_v4();
        let created_at = now();

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {} (id, {}, user_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
                t.comments, t.key
            ),
            (
                id.to_string(),
                content_id.to_string(),
                author_id.to_string(),
                text,
                &created_at,
            ),
        )
        .context("Failed to create comment")?;
        refresh_comment_count(&tx, kind, content_id)?;
        let author_username: String = tx.query_row(
            "SELECT username FROM users WHERE id = ?",
            [author_id.to_string()],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok(Comment {
            id,
            content_kind: kind,
            content_id: *content_id,
            author_id: *author_id,
            author_username,
            content: text.to_string(),
            created_at: created_at.parse()?,
        })
    }

    /// Comments on a piece of content, oldest first
    pub fn list_comments(&self, kind: ContentKind, content_id: &Uuid) -> Result<Vec<Comment>> {
        let t = tables(kind);
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT c.id, c.{key}, c.user_id, u.username, c.content, c.created_at
             FROM {comments} c
             JOIN users u ON u.id = c.user_id
             WHERE c.{key} = ?
             ORDER BY c.created_at ASC",
            key = t.key,
            comments = t.comments
        ))?;

        let comments = stmt
            .query_map([content_id.to_string()], |row| comment_from_row(kind, row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    /// Find a comment on either a post or a reel
    pub fn get_comment(&self, comment_id: &Uuid) -> Result<Option<Comment>> {
        let conn = self.pool.get()?;
        for kind in [ContentKind::Post, ContentKind::Reel] {
            let t = tables(kind);
            let comment = conn
                .query_row(
                    &format!(
                        "SELECT c.id, c.{key}, c.user_id, u.username, c.content, c.created_at
                         FROM {comments} c
                         JOIN users u ON u.id = c.user_id
                         WHERE c.id = ?",
                        key = t.key,
                        comments = t.comments
                    ),
                    [comment_id.to_string()],
                    |row| comment_from_row(kind, row),
                )
                .optional()?;
            if comment.is_some() {
                return Ok(comment);
            }
        }
        Ok(None)
    }

    /// Delete a comment and refresh the counter of the content it was on
    pub fn delete_comment(&self, comment: &Comment) -> Result<()> {
        let t = tables(comment.content_kind);
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM {} WHERE id = ?", t.comments),
            [comment.id.to_string()],
        )
        .context("Failed to delete comment")?;
        refresh_comment_count(&tx, comment.content_kind, &comment.content_id)?;
        tx.commit()?;
        Ok(())
    }
}

fn refresh_comment_count(
    conn: &rusqlite::Connection,
    kind: ContentKind,
    content_id: &Uuid,
) -> Result<()> {
    let t = tables(kind);
    conn.execute(
        &format!(
            "UPDATE {content} SET comments_count = (SELECT COUNT(*) FROM {comments} WHERE {key} = ?1) WHERE id = ?1",
            content = t.content,
            comments = t.comments,
            key = t.key
        ),
        [content_id.to_string()],
    )
    .context("Failed to update comment count")?;
    Ok(())
}
