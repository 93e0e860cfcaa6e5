use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use circle_types::{FriendRequest, FriendRequestStatus};

use crate::db::rows::{enum_at, now, timestamp_at, uuid_at};
use crate::db::DbPool;

const REQUEST_SELECT: &str = "SELECT r.id, r.sender_id, s.username, r.receiver_id, t.username, r.status,
            r.created_at, r.updated_at
     FROM friend_requests r
     JOIN users s ON s.id = r.sender_id
     JOIN users t ON t.id = r.receiver_id";

fn request_from_row(row: &Row) -> rusqlite::Result<FriendRequest> {
    Ok(FriendRequest {
        id: uuid_at(row, 0)?,
        sender_id: uuid_at(row, 1)?,
        sender_username: row.get(2)?,
        receiver_id: uuid_at(row, 3)?,
        receiver_username: row.get(4)?,
        status: enum_at(row, 5, FriendRequestStatus::parse)?,
        created_at: timestamp_at(row, 6)?,
        updated_at: timestamp_at(row, 7)?,
    })
}

/// Friend requests move `pending -> accepted | declined`; a pending request
/// may also be withdrawn (deleted) by its sender.
pub struct FriendRequestRepository {
    pool: DbPool,
}

impl FriendRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn get(&self, request_id: &Uuid) -> Result<Option<FriendRequest>> {
        let conn = self.pool.get()?;
        let request = conn
            .query_row(
                &format!("{} WHERE r.id = ?", REQUEST_SELECT),
                [request_id.to_string()],
                request_from_row,
            )
            .optional()?;
        Ok(request)
    }

    /// The pending request `sender -> receiver`, if there is one
    pub fn find_pending(&self, sender_id: &Uuid, receiver_id: &Uuid) -> Result<Option<FriendRequest>> {
        let conn = self.pool.get()?;
        let request = conn
            .query_row(
                &format!(
                    "{} WHERE r.sender_id = ? AND r.receiver_id = ? AND r.status = 'pending'",
                    REQUEST_SELECT
                ),
                (sender_id.to_string(), receiver_id.to_string()),
                request_from_row,
            )
            .optional()?;
        Ok(request)
    }

    pub fn create(&self, sender_id: &Uuid, receiver_id: &Uuid) -> Result<FriendRequest> {
        let id = Uuid::new_v4();
        let created_at = now();
        {
            let conn = self.pool.get()?;
            conn.execute(
                "INSERT INTO friend_requests (id, sender_id, receiver_id, status, created_at, updated_at)
                 VALUES (?, ?, ?, 'pending', ?, ?)",
                (
                    id.to_string(),
                    sender_id.to_string(),
                    receiver_id.to_string(),
                    &created_at,
                    &created_at,
                ),
            )
            .context("Failed to create friend request")?;
        }
        self.get(&id)?.context("Friend request missing after insert")
    }

    /// Accept a pending request and create both accepted follower edges.
    ///
    /// # Returns
    /// * `false` - If the request was not pending
    pub fn accept(&self, request_id: &Uuid) -> Result<bool> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let stamp = now();

        let pair: Option<(String, String)> = tx
            .query_row(
                "SELECT sender_id, receiver_id FROM friend_requests WHERE id = ? AND status = 'pending'",
                [request_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((sender, receiver)) = pair else {
            return Ok(false);
        };

        tx.execute(
            "UPDATE friend_requests SET status = 'accepted', updated_at = ? WHERE id = ?",
            (&stamp, request_id.to_string()),
        )
        .context("Failed to accept friend request")?;
        for (follower, followed) in [(&sender, &receiver), (&receiver, &sender)] {
            tx.execute(
                "INSERT INTO followers (follower_id, followed_id, status, created_at)
                 VALUES (?, ?, 'accepted', ?)
                 ON CONFLICT(follower_id, followed_id) DO NOTHING",
                (follower, followed, &stamp),
            )
            .context("Failed to create follower edge")?;
        }

        tx.commit()?;
        Ok(true)
    }

    /// Decline a pending request
    pub fn decline(&self, request_id: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "UPDATE friend_requests SET status = 'declined', updated_at = ?
                 WHERE id = ? AND status = 'pending'",
                (now(), request_id.to_string()),
            )
            .context("Failed to decline friend request")?;
        Ok(rows > 0)
    }

    /// Withdraw a pending request
    pub fn cancel(&self, request_id: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "DELETE FROM friend_requests WHERE id = ? AND status = 'pending'",
                [request_id.to_string()],
            )
            .context("Failed to cancel friend request")?;
        Ok(rows > 0)
    }

    /// Pending requests addressed to `user_id`, newest first
    pub fn incoming(&self, user_id: &Uuid) -> Result<Vec<FriendRequest>> {
        self.list_pending("r.receiver_id", user_id)
    }

    /// Pending requests sent by `user_id`, newest first
    pub fn outgoing(&self, user_id: &Uuid) -> Result<Vec<FriendRequest>> {
        self.list_pending("r.sender_id", user_id)
    }

    fn list_pending(&self, column: &str, user_id: &Uuid) -> Result<Vec<FriendRequest>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE {} = ? AND r.status = 'pending' ORDER BY r.created_at DESC",
            REQUEST_SELECT, column
        ))?;
        let requests = stmt
            .query_map([user_id.to_string()], request_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::FollowRepository;
    use crate::db::testing::{create_user, test_db};

    #[test]
    fn test_accept_creates_mutual_friendship() {
        let db = test_db();
        let repo = FriendRequestRepository::new(db.pool.clone());
        let follows = FollowRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let request = repo.create(&alice.id, &bob.id).unwrap();
        assert_eq!(request.status, FriendRequestStatus::Pending);
        assert_eq!(repo.incoming(&bob.id).unwrap().len(), 1);
        assert_eq!(repo.outgoing(&alice.id).unwrap().len(), 1);
        assert!(repo.find_pending(&alice.id, &bob.id).unwrap().is_some());
        assert!(repo.find_pending(&bob.id, &alice.id).unwrap().is_none());

        assert!(repo.accept(&request.id).unwrap());
        assert!(follows.are_friends(&alice.id, &bob.id).unwrap());
        assert_eq!(repo.get(&request.id).unwrap().unwrap().status, FriendRequestStatus::Accepted);
        assert!(repo.incoming(&bob.id).unwrap().is_empty());

        // no longer pending
        assert!(!repo.accept(&request.id).unwrap());
        assert!(!repo.decline(&request.id).unwrap());
    }

    #[test]
    fn test_accept_keeps_existing_follow_edge() {
        let db = test_db();
        let repo = FriendRequestRepository::new(db.pool.clone());
        let follows = FollowRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        follows.toggle_follow(&alice.id, &bob.id).unwrap();
        let request = repo.create(&alice.id, &bob.id).unwrap();
        assert!(repo.accept(&request.id).unwrap());
        assert_eq!(follows.follower_count(&bob.id).unwrap(), 1);
        assert!(follows.are_friends(&alice.id, &bob.id).unwrap());
    }

    #[test]
    fn test_decline_does_not_befriend() {
        let db = test_db();
        let repo = FriendRequestRepository::new(db.pool.clone());
        let follows = FollowRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let request = repo.create(&alice.id, &bob.id).unwrap();
        assert!(repo.decline(&request.id).unwrap());
        assert!(!follows.are_friends(&alice.id, &bob.id).unwrap());
        assert_eq!(repo.get(&request.id).unwrap().unwrap().status, FriendRequestStatus::Declined);
    }

    #[test]
    fn test_cancel_deletes_pending_only() {
        let db = test_db();
        let repo = FriendRequestRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let request = repo.create(&alice.id, &bob.id).unwrap();
        assert!(repo.cancel(&request.id).unwrap());
        assert!(repo.get(&request.id).unwrap().is_none());
        assert!(!repo.cancel(&request.id).unwrap());
    }

    #[test]
    fn test_block_clears_pending_requests() {
        let db = test_db();
        let repo = FriendRequestRepository::new(db.pool.clone());
        let follows = FollowRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        repo.create(&alice.id, &bob.id).unwrap();
        follows.block(&bob.id, &alice.id).unwrap();
        assert!(repo.outgoing(&alice.id).unwrap().is_empty());
    }
}
