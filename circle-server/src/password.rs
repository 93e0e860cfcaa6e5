//! Password hashing and recovery key generation.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{distributions::Alphanumeric, Rng};

const RECOVERY_KEY_GROUPS: usize = 4;
const RECOVERY_KEY_GROUP_LEN: usize = 4;

/// Hash a password with Argon2id and a random salt (PHC string output)
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC hash. A malformed stored hash
/// verifies as false.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("Stored password hash could not be parsed");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Generate a recovery key such as `K7QD-2MXA-9PLZ-E4RT`
pub fn generate_recovery_key() -> String {
    let mut rng = rand::thread_rng();
    (0..RECOVERY_KEY_GROUPS)
        .map(|_| {
            (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(RECOVERY_KEY_GROUP_LEN)
                .map(|b| char::from(b).to_ascii_uppercase())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Hash on the blocking pool; Argon2 is deliberately slow.
pub async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow!("Password hashing task failed: {}", e))?
}

pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| anyhow!("Password verification task failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash_password("correct horse").unwrap();
        assert!(hashed.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hashed));
        assert!(!verify_password("wrong horse", &hashed));
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let a = hash_password("secret-pass").unwrap();
        let b = hash_password("secret-pass").unwrap();
        assert_ne!(a, b, "salts should differ");
    }

    #[test]
    fn test_malformed_hash_does_not_verify() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_recovery_key_format() {
        let key = generate_recovery_key();
        let groups: Vec<&str> = key.split('-').collect();
        assert_eq!(groups.len(), RECOVERY_KEY_GROUPS);
        for group in groups {
            assert_eq!(group.len(), RECOVERY_KEY_GROUP_LEN);
            assert!(group.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
        assert_ne!(generate_recovery_key(), key);
    }

    #[tokio::test]
    async fn test_blocking_wrappers() {
        let hashed = hash_password_blocking("pw-123456".to_string()).await.unwrap();
        assert!(verify_password_blocking("pw-123456".to_string(), hashed).await.unwrap());
    }
}
