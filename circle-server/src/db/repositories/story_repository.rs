use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{named_params, OptionalExtension, Row};
use uuid::Uuid;

use circle_types::{Story, StoryViewer};

use crate::db::rows::{flag_at, now, summary_at, timestamp, timestamp_at, uuid_at, SUMMARY_COLUMNS};
use crate::db::DbPool;

/// Story columns plus the viewer's seen flag; binds `:viewer`.
const STORY_SELECT: &str = "SELECT s.id, s.user_id, u.username, s.media_url, s.caption, s.views_count,
            s.created_at, s.expires_at,
            EXISTS(SELECT 1 FROM story_views v WHERE v.story_id = s.id AND v.viewer_id = :viewer)
     FROM stories s
     JOIN users u ON u.id = s.user_id";

fn story_from_row(row: &Row) -> rusqlite::Result<Story> {
    Ok(Story {
        id: uuid_at(row, 0)?,
        author_id: uuid_at(row, 1)?,
        author_username: row.get(2)?,
        media_url: row.get(3)?,
        caption: row.get(4)?,
        views_count: row.get(5)?,
        created_at: timestamp_at(row, 6)?,
        expires_at: timestamp_at(row, 7)?,
        viewed_by_viewer: flag_at(row, 8)?,
    })
}

/// Stories are live while `now < expires_at`; reads never return expired rows.
pub struct StoryRepository {
    pool: DbPool,
}

impl StoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(
        &self,
        author_id: &Uuid,
        media_url: &str,
        caption: Option<&str>,
        ttl: Duration,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO stories (id, user_id, media_url, caption, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                author_id.to_string(),
                media_url,
                caption,
                timestamp(created_at),
                timestamp(created_at + ttl),
            ),
        )
        .context("Failed to create story")?;
        Ok(id)
    }

    /// Get a story that has not expired yet
    pub fn get_active(&self, story_id: &Uuid, viewer_id: &Uuid) -> Result<Option<Story>> {
        let conn = self.pool.get()?;
        let story = conn
            .query_row(
                &format!("{} WHERE s.id = :id AND s.expires_at > :now", STORY_SELECT),
                named_params! {
                    ":id": story_id.to_string(),
                    ":viewer": viewer_id.to_string(),
                    ":now": now(),
                },
                story_from_row,
            )
            .optional()?;
        Ok(story)
    }

    /// Live stories from the viewer and the users they follow, newest first
    pub fn list_active(&self, viewer_id: &Uuid) -> Result<Vec<Story>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE s.expires_at > :now
               AND (s.user_id = :viewer
                    OR s.user_id IN (SELECT followed_id FROM followers
                                     WHERE follower_id = :viewer AND status = 'accepted'))
             ORDER BY s.created_at DESC, s.rowid DESC",
            STORY_SELECT
        ))?;
        let stories = stmt
            .query_map(
                named_params! { ":viewer": viewer_id.to_string(), ":now": now() },
                story_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stories)
    }

    /// Author of a story, expired or not
    pub fn get_owner(&self, story_id: &Uuid) -> Result<Option<Uuid>> {
        let conn = self.pool.get()?;
        let owner = conn
            .query_row(
                "SELECT user_id FROM stories WHERE id = ?",
                [story_id.to_string()],
                |row| uuid_at(row, 0),
            )
            .optional()?;
        Ok(owner)
    }

    /// Record one view per viewer.
    ///
    /// # Returns
    /// * `(newly_viewed, views_count)`
    pub fn record_view(&self, story_id: &Uuid, viewer_id: &Uuid) -> Result<(bool, i64)> {
        let story = story_id.to_string();
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO story_views (story_id, viewer_id, viewed_at) VALUES (?, ?, ?)",
                (&story, viewer_id.to_string(), now()),
            )
            .context("Failed to record story view")?;
        tx.execute(
            "UPDATE stories SET views_count = (SELECT COUNT(*) FROM story_views WHERE story_id = ?1)
             WHERE id = ?1",
            [&story],
        )
        .context("Failed to update story views")?;
        let views: i64 = tx.query_row(
            "SELECT views_count FROM stories WHERE id = ?",
            [&story],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok((inserted > 0, views))
    }

    /// Who viewed a story, most recent first
    pub fn viewers(&self, story_id: &Uuid) -> Result<Vec<StoryViewer>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, v.viewed_at
             FROM story_views v
             JOIN users u ON u.id = v.viewer_id
             LEFT JOIN profiles p ON p.user_id = u.id
             WHERE v.story_id = ?
             ORDER BY v.viewed_at DESC",
            SUMMARY_COLUMNS
        ))?;
        let viewers = stmt
            .query_map([story_id.to_string()], |row| {
                Ok(StoryViewer {
                    user: summary_at(row, 0)?,
                    viewed_at: timestamp_at(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(viewers)
    }

    pub fn delete(&self, story_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute("DELETE FROM stories WHERE id = ?", [story_id.to_string()])
            .context("Failed to delete story")?;
        Ok(rows)
    }

    /// Remove stories that expired before `cutoff`
    pub fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "DELETE FROM stories WHERE expires_at < ?",
                [timestamp(cutoff)],
            )
            .context("Failed to purge expired stories")?;

        if rows > 0 {
            tracing::info!("Purged {} expired stories", rows);
        }
        Ok(rows)
    }
}
