use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use circle_types::{Profile, User, UserSummary};

use crate::db::rows::{flag_at, now, summary_at, timestamp_at, uuid_at, SUMMARY_COLUMNS};
use crate::db::DbPool;

const USER_COLUMNS: &str = "id, username, is_admin, is_banned, created_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_at(row, 0)?,
        username: row.get(1)?,
        is_admin: flag_at(row, 2)?,
        is_banned: flag_at(row, 3)?,
        created_at: timestamp_at(row, 4)?,
    })
}

/// Profile columns as they are written back by [`UserRepository::save_profile`].
#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
}

impl From<&Profile> for ProfileFields {
    fn from(profile: &Profile) -> Self {
        Self {
            display_name: profile.display_name.clone(),
            bio: profile.bio.clone(),
            avatar_url: profile.avatar_url.clone(),
            location: profile.location.clone(),
            website: profile.website.clone(),
        }
    }
}

pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create an account and its empty profile
    pub fn create(
        &self,
        username: &str,
        password_hash: &str,
        recovery_key: &str,
        display_name: Option<&str>,
    ) -> Result<User> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let id = Uuid::new_v4();
        let created_at = now();
        tx.execute(
            "INSERT INTO users (id, username, password_hash, recovery_key, is_admin, is_banned, created_at)
             VALUES (?, ?, ?, ?, 0, 0, ?)",
            (id.to_string(), username, password_hash, recovery_key, &created_at),
        )
        .context("Failed to create user")?;
        tx.execute(
            "INSERT INTO profiles (user_id, display_name) VALUES (?, ?)",
            (id.to_string(), display_name),
        )
        .context("Failed to create profile")?;
        tx.commit()?;

        Ok(User {
            id,
            username: username.to_string(),
            is_admin: false,
            is_banned: false,
            created_at: created_at.parse()?,
        })
    }

    /// Get user by ID
    pub fn get_by_id(&self, user_id: &Uuid) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                [user_id.to_string()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Get user by username (case-insensitive)
    pub fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS),
                [username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Get a user together with the stored password hash, for login
    pub fn get_credentials(&self, username: &str) -> Result<Option<(User, String)>> {
        let conn = self.pool.get()?;
        let credentials = conn
            .query_row(
                &format!(
                    "SELECT {}, password_hash FROM users WHERE username = ?",
                    USER_COLUMNS
                ),
                [username],
                |row| Ok((user_from_row(row)?, row.get::<_, String>(5)?)),
            )
            .optional()?;
        Ok(credentials)
    }

    pub fn get_password_hash(&self, user_id: &Uuid) -> Result<Option<String>> {
        let conn = self.pool.get()?;
        let hash = conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?",
                [user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn update_password(&self, user_id: &Uuid, password_hash: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users SET password_hash = ? WHERE id = ?",
            [password_hash, &user_id.to_string()],
        )
        .context("Failed to update password")?;
        Ok(())
    }

    /// Find the account a recovery key belongs to, if it matches the username
    pub fn find_by_recovery_key(&self, username: &str, recovery_key: &str) -> Result<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users WHERE username = ? AND recovery_key = ?",
                    USER_COLUMNS
                ),
                [username, recovery_key],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Reset the password and replace the (now spent) recovery key
    pub fn reset_password(&self, user_id: &Uuid, password_hash: &str, new_recovery_key: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users SET password_hash = ?, recovery_key = ? WHERE id = ?",
            [password_hash, new_recovery_key, &user_id.to_string()],
        )
        .context("Failed to reset password")?;
        Ok(())
    }

    /// Whether a username belongs to any account other than `user_id`
    pub fn username_taken_by_other(&self, username: &str, user_id: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ? AND id != ?",
            [username, &user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_profile(&self, user_id: &Uuid) -> Result<Option<Profile>> {
        let conn = self.pool.get()?;
        let profile = conn
            .query_row(
                "SELECT u.id, u.username, p.display_name, p.bio, p.avatar_url, p.location, p.website
                 FROM users u
                 LEFT JOIN profiles p ON p.user_id = u.id
                 WHERE u.id = ?",
                [user_id.to_string()],
                |row| {
                    Ok(Profile {
                        user_id: uuid_at(row, 0)?,
                        username: row.get(1)?,
                        display_name: row.get(2)?,
                        bio: row.get(3)?,
                        avatar_url: row.get(4)?,
                        location: row.get(5)?,
                        website: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    /// Overwrite all profile columns
    /// Write the profile columns and, when given, a new username in one
    /// transaction. Nothing is written if either statement fails.
    pub fn save_profile(
        &self,
        user_id: &Uuid,
        username: Option<&str>,
        fields: &ProfileFields,
    ) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        if let Some(username) = username {
            tx.execute(
                "UPDATE users SET username = ? WHERE id = ?",
                [username, &user_id.to_string()],
            )
            .context("Failed to update username")?;
        }
        tx.execute(
            "INSERT INTO profiles (user_id, display_name, bio, avatar_url, location, website)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                bio = excluded.bio,
                avatar_url = excluded.avatar_url,
                location = excluded.location,
                website = excluded.website",
            (
                user_id.to_string(),
                &fields.display_name,
                &fields.bio,
                &fields.avatar_url,
                &fields.location,
                &fields.website,
            ),
        )
        .context("Failed to update profile")?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_summary(&self, user_id: &Uuid) -> Result<Option<UserSummary>> {
        let conn = self.pool.get()?;
        let summary = conn
            .query_row(
                &format!(
                    "SELECT {} FROM users u LEFT JOIN profiles p ON p.user_id = u.id WHERE u.id = ?",
                    SUMMARY_COLUMNS
                ),
                [user_id.to_string()],
                |row| summary_at(row, 0),
            )
            .optional()?;
        Ok(summary)
    }

    /// Case-insensitive substring search over usernames and display names.
    /// Exact username matches sort first; banned accounts are left out.
    pub fn search(&self, query: &str, limit: i64) -> Result<Vec<UserSummary>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}
             FROM users u
             LEFT JOIN profiles p ON p.user_id = u.id
             WHERE u.is_banned = 0
               AND (instr(lower(u.username), lower(?1)) > 0
                    OR instr(lower(COALESCE(p.display_name, '')), lower(?1)) > 0)
             ORDER BY (lower(u.username) = lower(?1)) DESC, u.username ASC
             LIMIT ?2",
            SUMMARY_COLUMNS
        ))?;

        let users = stmt
            .query_map((query, limit), |row| summary_at(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Get all users (admin listing)
    pub fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY created_at ASC LIMIT ? OFFSET ?",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map((limit, offset), user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn set_banned(&self, user_id: &Uuid, banned: bool) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "UPDATE users SET is_banned = ? WHERE id = ?",
                (banned as i64, user_id.to_string()),
            )
            .context("Failed to update ban status")?;
        Ok(rows)
    }

    pub fn set_admin(&self, user_id: &Uuid, is_admin: bool) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "UPDATE users SET is_admin = ? WHERE id = ?",
                (is_admin as i64, user_id.to_string()),
            )
            .context("Failed to update admin flag")?;
        Ok(rows)
    }

    /// Grant admin by username (startup bootstrap)
    pub fn promote_by_username(&self, username: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute("UPDATE users SET is_admin = 1 WHERE username = ?", [username])
            .context("Failed to promote user")?;
        Ok(rows)
    }

    /// Delete an account; everything it owns goes with it through cascades.
    /// Counters on other users' content are recomputed afterwards since the
    /// account's likes, saves, shares and comments went with it.
    pub fn delete(&self, user_id: &Uuid) -> Result<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let rows = tx
            .execute("DELETE FROM users WHERE id = ?", [user_id.to_string()])
            .context("Failed to delete user")?;
        if rows > 0 {
            tx.execute_batch(
                "UPDATE posts SET
                    likes_count = (SELECT COUNT(*) FROM post_likes WHERE post_id = posts.id),
                    saves_count = (SELECT COUNT(*) FROM post_saves WHERE post_id = posts.id),
                    shares_count = (SELECT COUNT(*) FROM post_shares WHERE post_id = posts.id),
                    comments_count = (SELECT COUNT(*) FROM post_comments WHERE post_id = posts.id);
                 UPDATE reels SET
                    likes_count = (SELECT COUNT(*) FROM reel_likes WHERE reel_id = reels.id),
                    saves_count = (SELECT COUNT(*) FROM reel_saves WHERE reel_id = reels.id),
                    shares_count = (SELECT COUNT(*) FROM reel_shares WHERE reel_id = reels.id),
                    comments_count = (SELECT COUNT(*) FROM reel_comments WHERE reel_id = reels.id);
                 UPDATE stories SET
                    views_count = (SELECT COUNT(*) FROM story_views WHERE story_id = stories.id);",
            )
            .context("Failed to refresh counters after account deletion")?;
        }
        tx.commit()?;
        Ok(rows)
    }
}
