use anyhow::{Context, Result};
use rusqlite::{named_params, OptionalExtension, Row};
use uuid::Uuid;

use circle_types::{Post, Visibility};

use crate::db::rows::{
    enum_at, flag_at, now, opt_timestamp_at, timestamp_at, uuid_at, visible_to_viewer,
};
use crate::db::DbPool;

/// Post columns plus the viewer's like/save flags; binds `:viewer`.
const POST_SELECT: &str = "SELECT p.id, p.user_id, u.username, p.content, p.media_url, p.visibility,
            p.likes_count, p.comments_count, p.shares_count, p.saves_count,
            p.created_at, p.updated_at,
            EXISTS(SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = :viewer),
            EXISTS(SELECT 1 FROM post_saves s WHERE s.post_id = p.id AND s.user_id = :viewer)
     FROM posts p
     JOIN users u ON u.id = p.user_id";

fn post_from_row(row: &Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: uuid_at(row, 0)?,
        author_id: uuid_at(row, 1)?,
        author_username: row.get(2)?,
        content: row.get(3)?,
        media_url: row.get(4)?,
        visibility: enum_at(row, 5, Visibility::parse)?,
        likes_count: row.get(6)?,
        comments_count: row.get(7)?,
        shares_count: row.get(8)?,
        saves_count: row.get(9)?,
        created_at: timestamp_at(row, 10)?,
        updated_at: opt_timestamp_at(row, 11)?,
        liked_by_viewer: flag_at(row, 12)?,
        saved_by_viewer: flag_at(row, 13)?,
    })
}

pub struct PostRepository {
    pool: DbPool,
}

impl PostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new post
    pub fn create(
        &self,
        author_id: &Uuid,
        content: &str,
        media_url: Option<&str>,
        visibility: Visibility,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (id, user_id, content, media_url, visibility, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                author_id.to_string(),
                content,
                media_url,
                visibility.as_str(),
                now(),
            ),
        )
        .context("Failed to create post")?;
        Ok(id)
    }

    /// Get a post if `viewer` may see it
    pub fn get_visible(&self, post_id: &Uuid, viewer: Option<&Uuid>) -> Result<Option<Post>> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                &format!(
                    "{} WHERE p.id = :id AND {}",
                    POST_SELECT,
                    visible_to_viewer("p")
                ),
                named_params! {
                    ":id": post_id.to_string(),
                    ":viewer": viewer.map(|v| v.to_string()),
                },
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    /// Author of a post, ignoring visibility
    pub fn get_owner(&self, post_id: &Uuid) -> Result<Option<Uuid>> {
        let conn = self.pool.get()?;
        let owner = conn
            .query_row(
                "SELECT user_id FROM posts WHERE id = ?",
                [post_id.to_string()],
                |row| uuid_at(row, 0),
            )
            .optional()?;
        Ok(owner)
    }

    /// Overwrite the editable columns and stamp `updated_at`
    pub fn update(
        &self,
        post_id: &Uuid,
        content: &str,
        media_url: Option<&str>,
        visibility: Visibility,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE posts SET content = ?, media_url = ?, visibility = ?, updated_at = ? WHERE id = ?",
            (content, media_url, visibility.as_str(), now(), post_id.to_string()),
        )
        .context("Failed to update post")?;
        Ok(())
    }

    /// Delete a post; comments, likes, saves and shares cascade
    pub fn delete(&self, post_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute("DELETE FROM posts WHERE id = ?", [post_id.to_string()])
            .context("Failed to delete post")?;
        Ok(rows)
    }

    /// Posts by the viewer and the users they follow, newest first
    pub fn feed(&self, viewer_id: &Uuid, limit: i64, offset: i64) -> Result<Vec<Post>> {
        self.query_posts(
            &format!(
                "{} WHERE (p.user_id = :viewer
                        OR p.user_id IN (SELECT followed_id FROM followers
                                         WHERE follower_id = :viewer AND status = 'accepted'))
                   AND {}
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT :limit OFFSET :offset",
                POST_SELECT,
                visible_to_viewer("p")
            ),
            Some(viewer_id),
            None,
            limit,
            offset,
        )
    }

    /// Posts written by `author_id` that `viewer` may see
    pub fn list_by_user(
        &self,
        author_id: &Uuid,
        viewer: Option<&Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>> {
        self.query_posts(
            &format!(
                "{} WHERE p.user_id = :subject AND {}
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT :limit OFFSET :offset",
                POST_SELECT,
                visible_to_viewer("p")
            ),
            viewer,
            Some(author_id),
            limit,
            offset,
        )
    }

    /// Posts the viewer saved and can still see, most recently saved first
    pub fn list_saved(&self, viewer_id: &Uuid, limit: i64, offset: i64) -> Result<Vec<Post>> {
        self.query_posts(
            &format!(
                "{} JOIN post_saves ps ON ps.post_id = p.id AND ps.user_id = :viewer
                 WHERE {}
                 ORDER BY ps.created_at DESC
                 LIMIT :limit OFFSET :offset",
                POST_SELECT,
                visible_to_viewer("p")
            ),
            Some(viewer_id),
            None,
            limit,
            offset,
        )
    }

    /// Get post count for a user
    pub fn count_by_user(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE user_id = ?",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query_posts(
        &self,
        sql: &str,
        viewer: Option<&Uuid>,
        subject: Option<&Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let viewer = viewer.map(|v| v.to_string());
        let posts = match subject {
            Some(subject) => stmt
                .query_map(
                    named_params! {
                        ":viewer": viewer,
                        ":subject": subject.to_string(),
                        ":limit": limit,
                        ":offset": offset,
                    },
                    post_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(
                    named_params! {
                        ":viewer": viewer,
                        ":limit": limit,
                        ":offset": offset,
                    },
                    post_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{Engagement, EngagementRepository, FollowRepository};
    use crate::db::testing::{create_user, test_db};
    use circle_types::ContentKind;

    #[test]
    fn test_create_and_get_with_viewer_flags() {
        let db = test_db();
        let repo = PostRepository::new(db.pool.clone());
        let engagement = EngagementRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");

        let id = repo.create(&alice.id, "hello world", None, Visibility::Public).unwrap();
        engagement
            .toggle(ContentKind::Post, Engagement::Like, &id, &alice.id)
            .unwrap();

        let post = repo.get_visible(&id, Some(&alice.id)).unwrap().unwrap();
        assert_eq!(post.content, "hello world");
        assert_eq!(post.author_username, "alice");
        assert_eq!(post.likes_count, 1);
        assert!(post.liked_by_viewer);
        assert!(!post.saved_by_viewer);
        assert!(post.updated_at.is_none());

        let anonymous = repo.get_visible(&id, None).unwrap().unwrap();
        assert!(!anonymous.liked_by_viewer);
    }

    #[test]
    fn test_friends_only_visibility() {
        let db = test_db();
        let repo = PostRepository::new(db.pool.clone());
        let follows = FollowRepository::new(db.pool.clone());
        let owner = create_user(&db, "owner");
        let follower = create_user(&db, "follower");
        let followed = create_user(&db, "followed");
        let stranger = create_user(&db, "stranger");

        let id = repo.create(&owner.id, "friends only", None, Visibility::Friends).unwrap();
        follows.toggle_follow(&follower.id, &owner.id).unwrap();
        follows.toggle_follow(&owner.id, &followed.id).unwrap();

        assert!(repo.get_visible(&id, Some(&owner.id)).unwrap().is_some());
        assert!(repo.get_visible(&id, Some(&follower.id)).unwrap().is_some());
        assert!(repo.get_visible(&id, Some(&followed.id)).unwrap().is_some());
        assert!(repo.get_visible(&id, Some(&stranger.id)).unwrap().is_none());
        assert!(repo.get_visible(&id, None).unwrap().is_none());
        assert_eq!(repo.get_owner(&id).unwrap(), Some(owner.id));
    }

    #[test]
    fn test_block_hides_posts_both_ways() {
        let db = test_db();
        let repo = PostRepository::new(db.pool.clone());
        let follows = FollowRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let alice_post = repo.create(&alice.id, "by alice", None, Visibility::Public).unwrap();
        let bob_post = repo.create(&bob.id, "by bob", None, Visibility::Public).unwrap();
        follows.block(&alice.id, &bob.id).unwrap();

        assert!(repo.get_visible(&alice_post, Some(&bob.id)).unwrap().is_none());
        assert!(repo.get_visible(&bob_post, Some(&alice.id)).unwrap().is_none());
        assert!(repo.get_visible(&alice_post, Some(&alice.id)).unwrap().is_some());
        assert!(repo.get_visible(&alice_post, None).unwrap().is_some());
    }

    #[test]
    fn test_feed_includes_self_and_followed_only() {
        let db = test_db();
        let repo = PostRepository::new(db.pool.clone());
        let follows = FollowRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");
        let carol = create_user(&db, "carol");

        repo.create(&alice.id, "mine", None, Visibility::Public).unwrap();
        repo.create(&bob.id, "from bob", None, Visibility::Public).unwrap();
        repo.create(&carol.id, "from carol", None, Visibility::Public).unwrap();
        follows.toggle_follow(&alice.id, &bob.id).unwrap();

        let feed = repo.feed(&alice.id, 20, 0).unwrap();
        let contents: Vec<&str> = feed.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["from bob", "mine"]);

        assert_eq!(repo.feed(&alice.id, 1, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_update_and_delete_cascades() {
        let db = test_db();
        let repo = PostRepository::new(db.pool.clone());
        let engagement = EngagementRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let id = repo.create(&alice.id, "draft", None, Visibility::Public).unwrap();
        repo.update(&id, "final", Some("https://img/1.png"), Visibility::Friends).unwrap();
        let post = repo.get_visible(&id, Some(&alice.id)).unwrap().unwrap();
        assert_eq!(post.content, "final");
        assert_eq!(post.visibility, Visibility::Friends);
        assert!(post.updated_at.is_some());

        engagement.toggle(ContentKind::Post, Engagement::Like, &id, &bob.id).unwrap();
        engagement.toggle(ContentKind::Post, Engagement::Save, &id, &bob.id).unwrap();
        engagement.toggle(ContentKind::Post, Engagement::Share, &id, &bob.id).unwrap();
        engagement.add_comment(ContentKind::Post, &id, &bob.id, "nice").unwrap();

        assert_eq!(repo.delete(&id).unwrap(), 1);
        let conn = db.connection().unwrap();
        for table in ["post_likes", "post_saves", "post_shares", "post_comments"] {
            let remaining: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap();
            assert_eq!(remaining, 0, "{} should be empty", table);
        }
    }

    #[test]
    fn test_saved_and_user_listings() {
        let db = test_db();
        let repo = PostRepository::new(db.pool.clone());
        let engagement = EngagementRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let public = repo.create(&alice.id, "public", None, Visibility::Public).unwrap();
        repo.create(&alice.id, "hidden", None, Visibility::Friends).unwrap();
        engagement.toggle(ContentKind::Post, Engagement::Save, &public, &bob.id).unwrap();

        let saved = repo.list_saved(&bob.id, 20, 0).unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].saved_by_viewer);

        assert_eq!(repo.list_by_user(&alice.id, Some(&bob.id), 20, 0).unwrap().len(), 1);
        assert_eq!(repo.list_by_user(&alice.id, Some(&alice.id), 20, 0).unwrap().len(), 2);
        assert_eq!(repo.count_by_user(&alice.id).unwrap(), 2);
    }
}
