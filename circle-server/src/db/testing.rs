use circle_types::User;
use uuid::Uuid;

use super::repositories::UserRepository;
use super::Database;

pub fn test_db() -> Database {
    let db = Database::in_memory().expect("Failed to create test database");
    db.initialize().expect("Failed to initialize schema");
    db
}

/// Insert an account without running the password hasher.
pub fn create_user(db: &Database, username: &str) -> User {
    UserRepository::new(db.pool.clone())
        .create(
            username,
            "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNo",
            &format!("KEY-{}", Uuid::new_v4()),
            None,
        )
        .expect("Failed to create test user")
}
