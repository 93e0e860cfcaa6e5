use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sessions {
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stories {
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimit {
    pub max_requests: usize,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Auth {
    pub min_password_length: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Admin {
    /// Promoted to admin at startup when the account exists
    #[serde(default)]
    pub username: Option<String>,
}

const MAX_SESSION_TTL_DAYS: i64 = 3650;
const MAX_STORY_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub database: Database,
    pub sessions: Sessions,
    pub stories: Stories,
    pub rate_limit: RateLimit,
    pub auth: Auth,
    #[serde(default)]
    pub admin: Admin,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // 1. Try to load from settings.toml (optional for deployment)
        let config_file_name = "settings.toml";

        // Check in current directory
        let current_dir_path = PathBuf::from(config_file_name);
        if current_dir_path.exists() {
            builder = builder.add_source(File::from(current_dir_path).required(false));
        }

        // Check in circle-server directory (for development)
        let dev_path = PathBuf::from("circle-server").join(config_file_name);
        if dev_path.exists() {
            builder = builder.add_source(File::from(dev_path).required(false));
        }

        builder = Self::with_defaults(builder)?;

        // 2. Override with environment variables (highest priority)
        if let Ok(db_path) = std::env::var("DATABASE_PATH") {
            builder = builder.set_override("database.path", db_path)?;
        }
        if let Ok(port) = std::env::var("PORT") {
            builder = builder.set_override("server.port", port)?;
        }
        if let Ok(host) = std::env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }
        if let Ok(admin) = std::env::var("ADMIN_USERNAME") {
            builder = builder.set_override("admin.username", admin)?;
        }

        Self::from_builder(builder)
    }

    /// Defaults only, no files or environment (tests and embedding)
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::from_builder(Self::with_defaults(Config::builder())?)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject durations and limits that would expire everything at once or
    /// overflow a timestamp
    fn validate(&self) -> Result<(), ConfigError> {
        check_range("sessions.ttl_days", self.sessions.ttl_days, 1, MAX_SESSION_TTL_DAYS)?;
        check_range("stories.ttl_hours", self.stories.ttl_hours, 1, MAX_STORY_TTL_HOURS)?;
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Message(
                "rate_limit.max_requests must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(ConfigError::Message(
                "rate_limit.window_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn with_defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        // Default to 0.0.0.0 for deployment; HOST overrides for local development
        builder
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.path", "circle.db")?
            .set_default("sessions.ttl_days", 30)?
            .set_default("stories.ttl_hours", 24)?
            .set_default("rate_limit.max_requests", 100)?
            .set_default("rate_limit.window_seconds", 60)?
            .set_default("auth.min_password_length", 8)
    }
}

fn check_range(key: &str, value: i64, min: i64, max: i64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Message(format!(
            "{} must be between {} and {} (got {})",
            key, min, max, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::defaults().expect("defaults should deserialize");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.database.path, "circle.db");
        assert_eq!(settings.sessions.ttl_days, 30);
        assert_eq!(settings.stories.ttl_hours, 24);
        assert_eq!(settings.rate_limit.max_requests, 100);
        assert_eq!(settings.rate_limit.window_seconds, 60);
        assert_eq!(settings.auth.min_password_length, 8);
        assert!(settings.admin.username.is_none());
    }

    fn with_override(key: &str, value: i64) -> Result<Settings, ConfigError> {
        let builder = Settings::with_defaults(Config::builder())?.set_override(key, value)?;
        Settings::from_builder(builder)
    }

    #[test]
    fn test_rejects_out_of_range_durations() {
        assert!(with_override("sessions.ttl_days", 0).is_err());
        assert!(with_override("sessions.ttl_days", i64::MAX).is_err());
        assert!(with_override("stories.ttl_hours", -1).is_err());
        assert!(with_override("stories.ttl_hours", 1_000_000).is_err());
        assert!(with_override("rate_limit.window_seconds", 0).is_err());

        let settings = with_override("stories.ttl_hours", 48).expect("48 hours is in range");
        assert_eq!(settings.stories.ttl_hours, 48);
    }
}
