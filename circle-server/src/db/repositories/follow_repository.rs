use anyhow::{Context, Result};
use rusqlite::{named_params, OptionalExtension};
use uuid::Uuid;

use circle_types::{FollowStatus, FriendSuggestion, RelationshipStatus, UserSummary};

use crate::db::rows::{enum_at, now, summary_at, SUMMARY_COLUMNS};
use crate::db::DbPool;

/// Ids of users with reciprocal accepted edges to `:me`.
const FRIEND_IDS: &str = "SELECT a.followed_id AS id
     FROM followers a
     JOIN followers b ON b.follower_id = a.followed_id AND b.followed_id = a.follower_id
     WHERE a.follower_id = :me AND a.status = 'accepted' AND b.status = 'accepted'";

/// Outcome of [`FollowRepository::toggle_follow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowToggle {
    Followed,
    Unfollowed,
    /// A block exists in one direction or the other; nothing changed
    Blocked,
}

pub struct FollowRepository {
    pool: DbPool,
}

impl FollowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Status of the directed edge `follower -> followed`, if any
    pub fn edge_status(&self, follower_id: &Uuid, followed_id: &Uuid) -> Result<Option<FollowStatus>> {
        let conn = self.pool.get()?;
        let status = conn
            .query_row(
                "SELECT status FROM followers WHERE follower_id = ? AND followed_id = ?",
                (follower_id.to_string(), followed_id.to_string()),
                |row| enum_at(row, 0, FollowStatus::parse),
            )
            .optional()?;
        Ok(status)
    }

    /// Check if user A is following user B
    pub fn is_following(&self, follower_id: &Uuid, followed_id: &Uuid) -> Result<bool> {
        Ok(self.edge_status(follower_id, followed_id)? == Some(FollowStatus::Accepted))
    }

    /// Check if users are friends (both follow each other)
    pub fn are_friends(&self, user_a: &Uuid, user_b: &Uuid) -> Result<bool> {
        Ok(self.is_following(user_a, user_b)? && self.is_following(user_b, user_a)?)
    }

    /// Whether either user has blocked the other
    pub fn is_blocked_either(&self, user_a: &Uuid, user_b: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM followers
             WHERE status = 'blocked'
               AND ((follower_id = ?1 AND followed_id = ?2) OR (follower_id = ?2 AND followed_id = ?1))",
            (user_a.to_string(), user_b.to_string()),
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Follow when no edge exists, unfollow when an accepted edge exists.
    pub fn toggle_follow(&self, follower_id: &Uuid, followed_id: &Uuid) -> Result<FollowToggle> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let (follower, followed) = (follower_id.to_string(), followed_id.to_string());

        let blocked: i64 = tx.query_row(
            "SELECT COUNT(*) FROM followers
             WHERE status = 'blocked'
               AND ((follower_id = ?1 AND followed_id = ?2) OR (follower_id = ?2 AND followed_id = ?1))",
            (&follower, &followed),
            |row| row.get(0),
        )?;
        if blocked > 0 {
            return Ok(FollowToggle::Blocked);
        }

        let removed = tx
            .execute(
                "DELETE FROM followers WHERE follower_id = ? AND followed_id = ? AND status = 'accepted'",
                (&follower, &followed),
            )
            .context("Failed to unfollow user")?;

        let outcome = if removed > 0 {
            FollowToggle::Unfollowed
        } else {
            tx.execute(
                "INSERT INTO followers (follower_id, followed_id, status, created_at) VALUES (?, ?, 'accepted', ?)",
                (&follower, &followed, now()),
            )
            .context("Failed to follow user")?;
            FollowToggle::Followed
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Block a user. Follow edges in both directions and pending friend
    /// requests between the pair are removed.
    pub fn block(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let (blocker, blocked) = (blocker_id.to_string(), blocked_id.to_string());

        tx.execute(
            "DELETE FROM followers
             WHERE (follower_id = ?1 AND followed_id = ?2 AND status = 'accepted')
                OR (follower_id = ?2 AND followed_id = ?1 AND status = 'accepted')",
            (&blocker, &blocked),
        )
        .context("Failed to remove follow edges")?;
        tx.execute(
            "DELETE FROM friend_requests
             WHERE status = 'pending'
               AND ((sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1))",
            (&blocker, &blocked),
        )
        .context("Failed to remove pending friend requests")?;
        tx.execute(
            "INSERT INTO followers (follower_id, followed_id, status, created_at) VALUES (?, ?, 'blocked', ?)
             ON CONFLICT(follower_id, followed_id) DO UPDATE SET status = 'blocked', created_at = excluded.created_at",
            (&blocker, &blocked, now()),
        )
        .context("Failed to block user")?;

        tx.commit()?;
        Ok(())
    }

    /// Remove a block placed by `blocker_id`
    pub fn unblock(&self, blocker_id: &Uuid, blocked_id: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "DELETE FROM followers WHERE follower_id = ? AND followed_id = ? AND status = 'blocked'",
                (blocker_id.to_string(), blocked_id.to_string()),
            )
            .context("Failed to unblock user")?;
        Ok(rows > 0)
    }

    /// Users blocked by `user_id`
    pub fn blocked_users(&self, user_id: &Uuid) -> Result<Vec<UserSummary>> {
        self.list_summaries(
            "SELECT {cols}
             FROM followers f
             JOIN users u ON u.id = f.followed_id
             LEFT JOIN profiles p ON p.user_id = u.id
             WHERE f.follower_id = :me AND f.status = 'blocked'
             ORDER BY f.created_at DESC",
            user_id,
        )
    }

    /// Get list of users that follow this user
    pub fn followers(&self, user_id: &Uuid) -> Result<Vec<UserSummary>> {
        self.list_summaries(
            "SELECT {cols}
             FROM followers f
             JOIN users u ON u.id = f.follower_id
             LEFT JOIN profiles p ON p.user_id = u.id
             WHERE f.followed_id = :me AND f.status = 'accepted'
             ORDER BY f.created_at DESC",
            user_id,
        )
    }

    /// Get list of users that this user is following
    pub fn following(&self, user_id: &Uuid) -> Result<Vec<UserSummary>> {
        self.list_summaries(
            "SELECT {cols}
             FROM followers f
             JOIN users u ON u.id = f.followed_id
             LEFT JOIN profiles p ON p.user_id = u.id
             WHERE f.follower_id = :me AND f.status = 'accepted'
             ORDER BY f.created_at DESC",
            user_id,
        )
    }

    /// Users with reciprocal accepted edges
    pub fn friends(&self, user_id: &Uuid) -> Result<Vec<UserSummary>> {
        self.list_summaries(
            &format!(
                "SELECT {{cols}}
                 FROM ({}) fr
                 JOIN users u ON u.id = fr.id
                 LEFT JOIN profiles p ON p.user_id = u.id
                 ORDER BY u.username ASC",
                FRIEND_IDS
            ),
            user_id,
        )
    }

    /// Friends that `user_id` and `other_id` have in common
    pub fn mutual_friends(&self, user_id: &Uuid, other_id: &Uuid) -> Result<Vec<UserSummary>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}
             FROM ({}) mine
             JOIN ({}) theirs ON theirs.id = mine.id
             JOIN users u ON u.id = mine.id
             LEFT JOIN profiles p ON p.user_id = u.id
             ORDER BY u.username ASC",
            SUMMARY_COLUMNS,
            FRIEND_IDS,
            FRIEND_IDS.replace(":me", ":other"),
        ))?;

        let users = stmt
            .query_map(
                named_params! { ":me": user_id.to_string(), ":other": other_id.to_string() },
                |row| summary_at(row, 0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Friends of friends ranked by how many friends they share with `user_id`.
    /// Excludes the user, anyone they already follow or blocked, anyone who
    /// blocked them, and banned accounts.
    pub fn suggestions(&self, user_id: &Uuid, limit: i64) -> Result<Vec<FriendSuggestion>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, COUNT(*) AS mutual_count
             FROM ({}) mine
             JOIN followers a ON a.follower_id = mine.id AND a.status = 'accepted'
             JOIN followers b ON b.follower_id = a.followed_id AND b.followed_id = a.follower_id
                             AND b.status = 'accepted'
             JOIN users u ON u.id = a.followed_id
             LEFT JOIN profiles p ON p.user_id = u.id
             WHERE u.id != :me
               AND u.is_banned = 0
               AND NOT EXISTS (SELECT 1 FROM followers x WHERE x.follower_id = :me AND x.followed_id = u.id)
               AND NOT EXISTS (SELECT 1 FROM followers x
                               WHERE x.follower_id = u.id AND x.followed_id = :me AND x.status = 'blocked')
             GROUP BY u.id
             ORDER BY mutual_count DESC, u.username ASC
             LIMIT :limit",
            SUMMARY_COLUMNS, FRIEND_IDS
        ))?;

        let suggestions = stmt
            .query_map(
                named_params! { ":me": user_id.to_string(), ":limit": limit },
                |row| {
                    Ok(FriendSuggestion {
                        user: summary_at(row, 0)?,
                        mutual_count: row.get(4)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(suggestions)
    }

    /// Get follower count
    pub fn follower_count(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM followers WHERE followed_id = ? AND status = 'accepted'",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get following count
    pub fn following_count(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM followers WHERE follower_id = ? AND status = 'accepted'",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// How `target_id` relates to `viewer_id`, as shown on a profile
    pub fn relationship(&self, viewer_id: &Uuid, target_id: &Uuid) -> Result<RelationshipStatus> {
        if viewer_id == target_id {
            return Ok(RelationshipStatus::Self_);
        }

        let outgoing = self.edge_status(viewer_id, target_id)?;
        let incoming = self.edge_status(target_id, viewer_id)?;

        let status = match (outgoing, incoming) {
            (Some(FollowStatus::Blocked), _) | (_, Some(FollowStatus::Blocked)) => {
                RelationshipStatus::Blocked
            }
            (Some(FollowStatus::Accepted), Some(FollowStatus::Accepted)) => RelationshipStatus::Friends,
            (Some(FollowStatus::Accepted), None) => RelationshipStatus::Following,
            (None, Some(FollowStatus::Accepted)) => RelationshipStatus::FollowsYou,
            (None, None) => RelationshipStatus::None,
        };
        Ok(status)
    }

    /// Run a summary listing; `{cols}` in `sql` expands to the summary columns
    /// and `:me` binds to `user_id`.
    fn list_summaries(&self, sql: &str, user_id: &Uuid) -> Result<Vec<UserSummary>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&sql.replace("{cols}", SUMMARY_COLUMNS))?;
        let users = stmt
            .query_map(named_params! { ":me": user_id.to_string() }, |row| {
                summary_at(row, 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{create_user, test_db};
    use crate::db::Database;

    fn setup() -> (Database, FollowRepository) {
        let db = test_db();
        let repo = FollowRepository::new(db.pool.clone());
        (db, repo)
    }

    fn befriend(repo: &FollowRepository, a: &Uuid, b: &Uuid) {
        assert_eq!(repo.toggle_follow(a, b).unwrap(), FollowToggle::Followed);
        assert_eq!(repo.toggle_follow(b, a).unwrap(), FollowToggle::Followed);
    }

    #[test]
    fn test_toggle_follow_follows_then_unfollows() {
        let (db, repo) = setup();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        assert_eq!(repo.toggle_follow(&alice.id, &bob.id).unwrap(), FollowToggle::Followed);
        assert!(repo.is_following(&alice.id, &bob.id).unwrap());
        assert!(!repo.is_following(&bob.id, &alice.id).unwrap());
        assert_eq!(repo.follower_count(&bob.id).unwrap(), 1);

        assert_eq!(repo.toggle_follow(&alice.id, &bob.id).unwrap(), FollowToggle::Unfollowed);
        assert_eq!(repo.follower_count(&bob.id).unwrap(), 0);
    }

    #[test]
    fn test_block_removes_edges_and_forbids_follow() {
        let (db, repo) = setup();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");
        befriend(&repo, &alice.id, &bob.id);

        repo.block(&alice.id, &bob.id).unwrap();

        assert!(!repo.is_following(&bob.id, &alice.id).unwrap());
        assert_eq!(repo.edge_status(&alice.id, &bob.id).unwrap(), Some(FollowStatus::Blocked));
        assert!(repo.is_blocked_either(&bob.id, &alice.id).unwrap());
        assert_eq!(repo.toggle_follow(&bob.id, &alice.id).unwrap(), FollowToggle::Blocked);
        assert_eq!(repo.toggle_follow(&alice.id, &bob.id).unwrap(), FollowToggle::Blocked);
        assert_eq!(repo.relationship(&bob.id, &alice.id).unwrap(), RelationshipStatus::Blocked);

        let blocked = repo.blocked_users(&alice.id).unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].id, bob.id);

        assert!(repo.unblock(&alice.id, &bob.id).unwrap());
        assert!(!repo.unblock(&alice.id, &bob.id).unwrap());
        assert_eq!(repo.toggle_follow(&bob.id, &alice.id).unwrap(), FollowToggle::Followed);
    }

    #[test]
    fn test_relationship_states() {
        let (db, repo) = setup();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        assert_eq!(repo.relationship(&alice.id, &alice.id).unwrap(), RelationshipStatus::Self_);
        assert_eq!(repo.relationship(&alice.id, &bob.id).unwrap(), RelationshipStatus::None);

        repo.toggle_follow(&alice.id, &bob.id).unwrap();
        assert_eq!(repo.relationship(&alice.id, &bob.id).unwrap(), RelationshipStatus::Following);
        assert_eq!(repo.relationship(&bob.id, &alice.id).unwrap(), RelationshipStatus::FollowsYou);

        repo.toggle_follow(&bob.id, &alice.id).unwrap();
        assert_eq!(repo.relationship(&alice.id, &bob.id).unwrap(), RelationshipStatus::Friends);
        assert!(repo.are_friends(&alice.id, &bob.id).unwrap());
    }

    #[test]
    fn test_friends_and_mutual_friends() {
        let (db, repo) = setup();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");
        let carol = create_user(&db, "carol");
        let dave = create_user(&db, "dave");

        befriend(&repo, &alice.id, &carol.id);
        befriend(&repo, &bob.id, &carol.id);
        befriend(&repo, &alice.id, &dave.id);
        // one-directional edge is not a friendship
        repo.toggle_follow(&bob.id, &dave.id).unwrap();

        let friends: Vec<Uuid> = repo.friends(&alice.id).unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(friends, vec![carol.id, dave.id]);

        let mutual = repo.mutual_friends(&alice.id, &bob.id).unwrap();
        assert_eq!(mutual.len(), 1);
        assert_eq!(mutual[0].id, carol.id);
    }

    #[test]
    fn test_suggestions_rank_by_mutual_count_and_exclude() {
        let (db, repo) = setup();
        let me = create_user(&db, "me");
        let f1 = create_user(&db, "friend1");
        let f2 = create_user(&db, "friend2");
        let popular = create_user(&db, "popular");
        let lonely = create_user(&db, "lonely");
        let followed = create_user(&db, "followed");
        let blocker = create_user(&db, "blocker");

        befriend(&repo, &me.id, &f1.id);
        befriend(&repo, &me.id, &f2.id);
        befriend(&repo, &f1.id, &popular.id);
        befriend(&repo, &f2.id, &popular.id);
        befriend(&repo, &f1.id, &lonely.id);
        befriend(&repo, &f1.id, &followed.id);
        befriend(&repo, &f2.id, &blocker.id);
        repo.toggle_follow(&me.id, &followed.id).unwrap();
        repo.block(&blocker.id, &me.id).unwrap();

        let suggestions = repo.suggestions(&me.id, 10).unwrap();
        let names: Vec<&str> = suggestions.iter().map(|s| s.user.username.as_str()).collect();
        assert_eq!(names, vec!["popular", "lonely"]);
        assert_eq!(suggestions[0].mutual_count, 2);
        assert_eq!(suggestions[1].mutual_count, 1);
    }

    #[test]
    fn test_followers_and_following_lists() {
        let (db, repo) = setup();
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");
        let carol = create_user(&db, "carol");

        repo.toggle_follow(&bob.id, &alice.id).unwrap();
        repo.toggle_follow(&carol.id, &alice.id).unwrap();

        assert_eq!(repo.followers(&alice.id).unwrap().len(), 2);
        assert_eq!(repo.following(&bob.id).unwrap()[0].id, alice.id);
        assert_eq!(repo.following_count(&alice.id).unwrap(), 0);
    }
}
