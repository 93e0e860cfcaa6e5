use std::sync::Arc;

use crate::config::Settings;
use crate::db::Database;
use crate::rate_limit::RateLimiter;
use crate::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub session_manager: SessionManager,
    pub rate_limiter: RateLimiter,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(db: Database, settings: Settings) -> Self {
        let session_manager = SessionManager::new(db.clone(), settings.sessions.ttl_days);
        let rate_limiter = RateLimiter::new(
            settings.rate_limit.max_requests,
            settings.rate_limit.window_seconds,
        );
        Self {
            db,
            session_manager,
            rate_limiter,
            settings: Arc::new(settings),
        }
    }
}
