use crate::db::rows::{now, timestamp};
use crate::db::Database;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Database-backed session manager for token authentication
///
/// Manages user sessions, including:
/// - Session creation with UUID v4 tokens
/// - Session validation with expiry checking
/// - Session deletion (logout, ban, password change)
/// - Cleanup of expired sessions
#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(db: Database, ttl_days: i64) -> Self {
        Self {
            db,
            ttl: Duration::days(ttl_days),
        }
    }

    /// Create a new session for a user
    ///
    /// # Returns
    /// * `Result<String>` - The session token on success
    pub fn create_session(&self, user_id: Uuid) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let expires_at = created_at + self.ttl;

        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                token,
                user_id.to_string(),
                timestamp(created_at),
                timestamp(expires_at),
            ],
        )
        .context("Failed to create session")?;

        tracing::info!("Created session for user {}", user_id);
        Ok(token)
    }

    /// Validate a session token and return the associated user ID
    ///
    /// # Returns
    /// * `Err` - If the session is unknown or expired
    pub fn validate_session(&self, token: &str) -> Result<Uuid> {
        let (user_id_str, expires_at_str): (String, String) = {
            let conn = self.db.connection()?;
            conn.query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token = ?1",
                rusqlite::params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("Session not found")?
        };

        let expires_at = expires_at_str
            .parse::<DateTime<Utc>>()
            .context("Failed to parse expiry time")?;

        if Utc::now() > expires_at {
            self.delete_session(token)?;
            anyhow::bail!("Session has expired");
        }

        let user_id = Uuid::parse_str(&user_id_str).context("Failed to parse user ID")?;
        Ok(user_id)
    }

    /// Delete a session (logout)
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.db.connection()?;
        let rows_affected = conn
            .execute(
                "DELETE FROM sessions WHERE token = ?1",
                rusqlite::params![token],
            )
            .context("Failed to delete session")?;

        if rows_affected > 0 {
            tracing::info!("Deleted session");
        }

        Ok(())
    }

    /// Revoke every session a user holds
    ///
    /// # Returns
    /// * `Result<usize>` - The number of sessions deleted
    pub fn delete_user_sessions(&self, user_id: &Uuid) -> Result<usize> {
        let conn = self.db.connection()?;
        let rows_affected = conn
            .execute(
                "DELETE FROM sessions WHERE user_id = ?1",
                rusqlite::params![user_id.to_string()],
            )
            .context("Failed to revoke user sessions")?;

        if rows_affected > 0 {
            tracing::info!("Revoked {} sessions for user {}", rows_affected, user_id);
        }
        Ok(rows_affected)
    }

    /// Clean up expired sessions from the database
    ///
    /// # Returns
    /// * `Result<usize>` - The number of sessions deleted
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.db.connection()?;

        let rows_affected = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                rusqlite::params![now()],
            )
            .context("Failed to cleanup expired sessions")?;

        if rows_affected > 0 {
            tracing::info!("Cleaned up {} expired sessions", rows_affected);
        }

        Ok(rows_affected)
    }
}
