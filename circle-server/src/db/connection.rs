use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::time::Duration;

use super::schema::SCHEMA;

/// SQLite in-memory database identifier
const MEMORY_DB_PATH: &str = ":memory:";

/// Per-connection setup. SQLite leaves foreign key enforcement off by default,
/// and cascading deletes depend on it.
const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Database wrapper with connection pooling support
#[derive(Clone)]
pub struct Database {
    pub pool: DbPool,
}

impl Database {
    /// Create a new database connection pool
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (manager, in_memory) = Self::create_connection_manager(path);
        let manager = manager.with_init(|conn| {
            conn.execute_batch(CONNECTION_PRAGMAS)?;
            conn.busy_timeout(Duration::from_secs(5))
        });

        // Every in-memory connection is its own database, so the pool must
        // hand out the same one.
        let max_size = if in_memory { 1 } else { 10 };
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .context("Failed to create database connection pool")?;
        Ok(Self { pool })
    }

    /// Create appropriate connection manager based on path
    ///
    /// # Returns
    /// * the manager and whether it points at an in-memory database
    fn create_connection_manager<P: AsRef<Path>>(path: P) -> (SqliteConnectionManager, bool) {
        let path_str = path.as_ref().to_string_lossy();
        let trimmed_path = path_str.trim();

        if trimmed_path.eq_ignore_ascii_case(MEMORY_DB_PATH) {
            (SqliteConnectionManager::memory(), true)
        } else {
            (SqliteConnectionManager::file(path), false)
        }
    }

    /// Create an in-memory database pool (useful for testing)
    pub fn in_memory() -> Result<Self> {
        Self::new(MEMORY_DB_PATH)
    }

    /// Initialize the database schema
    pub fn initialize(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn connection(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .context("Failed to get database connection from pool")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(db: &Database) -> Vec<String> {
        let conn = db.connection().expect("Failed to get connection");
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .expect("Failed to prepare statement");

        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .expect("Failed to query tables")
            .collect::<Result<Vec<_>, _>>()
            .expect("Failed to collect tables");
        tables
    }

    #[test]
    fn test_database_creation() {
        let db = Database::in_memory().expect("Failed to create database");
        db.initialize().expect("Failed to initialize schema");

        let tables = table_names(&db);
        for expected in [
            "users",
            "profiles",
            "sessions",
            "posts",
            "post_likes",
            "post_comments",
            "reels",
            "stories",
            "followers",
            "friend_requests",
            "messages",
            "chat_groups",
            "group_members",
            "group_messages",
            "notifications",
            "support_tickets",
            "support_messages",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
        }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let db = Database::in_memory().expect("Failed to create database");
        db.initialize().expect("first initialize");
        db.initialize().expect("second initialize");
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = Database::in_memory().expect("Failed to create database");
        let conn = db.connection().expect("Failed to get connection");
        let enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .expect("Failed to read pragma");
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_memory_database_detection() {
        let memory_paths = [":memory:", " :memory: ", ":MEMORY:", " :Memory: "];

        for path in &memory_paths {
            let db = Database::new(path).expect("Failed to create memory database");
            db.initialize().expect("Failed to initialize schema");
            assert!(table_names(&db).contains(&"users".to_string()));
        }

        let temp_path = std::env::temp_dir().join(format!("circle-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(&temp_path).expect("Failed to create file database");
        db.initialize().expect("Failed to initialize file schema");
        drop(db);

        let _ = std::fs::remove_file(temp_path);
    }
}
