use anyhow::{Context, Result};
use rusqlite::{named_params, OptionalExtension, Row};
use uuid::Uuid;

use circle_types::{Reel, Visibility};

use crate::db::rows::{enum_at, flag_at, now, timestamp_at, uuid_at, visible_to_viewer};
use crate::db::DbPool;

const REEL_SELECT: &str = "SELECT r.id, r.user_id, u.username, r.video_url, r.caption, r.visibility,
            r.likes_count, r.comments_count, r.shares_count, r.saves_count, r.views_count,
            r.created_at,
            EXISTS(SELECT 1 FROM reel_likes l WHERE l.reel_id = r.id AND l.user_id = :viewer),
            EXISTS(SELECT 1 FROM reel_saves s WHERE s.reel_id = r.id AND s.user_id = :viewer)
     FROM reels r
     JOIN users u ON u.id = r.user_id";

fn reel_from_row(row: &Row) -> rusqlite::Result<Reel> {
    Ok(Reel {
        id: uuid_at(row, 0)?,
        author_id: uuid_at(row, 1)?,
        author_username: row.get(2)?,
        video_url: row.get(3)?,
        caption: row.get(4)?,
        visibility: enum_at(row, 5, Visibility::parse)?,
        likes_count: row.get(6)?,
        comments_count: row.get(7)?,
        shares_count: row.get(8)?,
        saves_count: row.get(9)?,
        views_count: row.get(10)?,
        created_at: timestamp_at(row, 11)?,
        liked_by_viewer: flag_at(row, 12)?,
        saved_by_viewer: flag_at(row, 13)?,
    })
}

pub struct ReelRepository {
    pool: DbPool,
}

impl ReelRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(
        &self,
        author_id: &Uuid,
        video_url: &str,
        caption: Option<&str>,
        visibility: Visibility,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO reels (id, user_id, video_url, caption, visibility, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                author_id.to_string(),
                video_url,
                caption,
                visibility.as_str(),
                now(),
            ),
        )
        .context("Failed to create reel")?;
        Ok(id)
    }

    /// Get a reel if `viewer` may see it
    pub fn get_visible(&self, reel_id: &Uuid, viewer: Option<&Uuid>) -> Result<Option<Reel>> {
        let conn = self.pool.get()?;
        let reel = conn
            .query_row(
                &format!("{} WHERE r.id = :id AND {}", REEL_SELECT, visible_to_viewer("r")),
                named_params! {
                    ":id": reel_id.to_string(),
                    ":viewer": viewer.map(|v| v.to_string()),
                },
                reel_from_row,
            )
            .optional()?;
        Ok(reel)
    }

    pub fn get_owner(&self, reel_id: &Uuid) -> Result<Option<Uuid>> {
        let conn = self.pool.get()?;
        let owner = conn
            .query_row(
                "SELECT user_id FROM reels WHERE id = ?",
                [reel_id.to_string()],
                |row| uuid_at(row, 0),
            )
            .optional()?;
        Ok(owner)
    }

    pub fn delete(&self, reel_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute("DELETE FROM reels WHERE id = ?", [reel_id.to_string()])
            .context("Failed to delete reel")?;
        Ok(rows)
    }

    /// Bump the view counter and return the new value
    pub fn record_view(&self, reel_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE reels SET views_count = views_count + 1 WHERE id = ?",
            [reel_id.to_string()],
        )
        .context("Failed to record reel view")?;
        let views: i64 = conn.query_row(
            "SELECT views_count FROM reels WHERE id = ?",
            [reel_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(views)
    }

    /// Every reel the viewer may see, newest first
    pub fn list(&self, viewer: Option<&Uuid>, limit: i64, offset: i64) -> Result<Vec<Reel>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE {} ORDER BY r.created_at DESC, r.rowid DESC LIMIT :limit OFFSET :offset",
            REEL_SELECT,
            visible_to_viewer("r")
        ))?;
        let reels = stmt
            .query_map(
                named_params! {
                    ":viewer": viewer.map(|v| v.to_string()),
                    ":limit": limit,
                    ":offset": offset,
                },
                reel_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reels)
    }

    /// Reels by `author_id` that `viewer` may see
    pub fn list_by_user(
        &self,
        author_id: &Uuid,
        viewer: Option<&Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Reel>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE r.user_id = :subject AND {}
             ORDER BY r.created_at DESC, r.rowid DESC
             LIMIT :limit OFFSET :offset",
            REEL_SELECT,
            visible_to_viewer("r")
        ))?;
        let reels = stmt
            .query_map(
                named_params! {
                    ":viewer": viewer.map(|v| v.to_string()),
                    ":subject": author_id.to_string(),
                    ":limit": limit,
                    ":offset": offset,
                },
                reel_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::FollowRepository;
    use crate::db::testing::{create_user, test_db};

    #[test]
    fn test_create_view_and_delete() {
        let db = test_db();
        let repo = ReelRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");

        let id = repo
            .create(&alice.id, "https://cdn/reel.mp4", Some("sunset"), Visibility::Public)
            .unwrap();
        assert_eq!(repo.record_view(&id).unwrap(), 1);
        assert_eq!(repo.record_view(&id).unwrap(), 2);

        let reel = repo.get_visible(&id, None).unwrap().unwrap();
        assert_eq!(reel.caption.as_deref(), Some("sunset"));
        assert_eq!(reel.views_count, 2);

        assert_eq!(repo.delete(&id).unwrap(), 1);
        assert!(repo.get_owner(&id).unwrap().is_none());
    }

    #[test]
    fn test_list_respects_visibility() {
        let db = test_db();
        let repo = ReelRepository::new(db.pool.clone());
        let follows = FollowRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");
        let carol = create_user(&db, "carol");

        repo.create(&alice.id, "a.mp4", None, Visibility::Public).unwrap();
        repo.create(&alice.id, "b.mp4", None, Visibility::Friends).unwrap();
        follows.toggle_follow(&bob.id, &alice.id).unwrap();

        assert_eq!(repo.list(Some(&bob.id), 20, 0).unwrap().len(), 2);
        assert_eq!(repo.list(Some(&carol.id), 20, 0).unwrap().len(), 1);
        assert_eq!(repo.list(None, 20, 0).unwrap().len(), 1);
        assert_eq!(repo.list_by_user(&alice.id, Some(&alice.id), 20, 0).unwrap().len(), 2);
    }
}
