//! Fixed-window request limits per signed-in account.
//!
//! Requests are counted against the account behind the session token, so
//! opening extra sessions does not buy extra requests. Anonymous requests and
//! unknown tokens pass through untouched; the handlers reject those anyway.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::api::ApiError;
use crate::auth::session_token;
use crate::state::AppState;

/// Accounts tracked before stale windows are swept out
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    hits: usize,
}

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<Uuid, Window>>>,
    max_requests: usize,
    length: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_seconds: u64) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            length: Duration::from_secs(window_seconds),
        }
    }

    /// Count one request by `user_id`.
    ///
    /// # Returns
    /// * `Err(wait)` - the account is over its limit until `wait` has passed
    pub fn hit(&self, user_id: Uuid) -> Result<(), Duration> {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() > SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.opened) < self.length);
        }

        let window = windows.entry(user_id).or_insert(Window { opened: now, hits: 0 });
        let elapsed = now.duration_since(window.opened);
        if elapsed >= self.length {
            *window = Window { opened: now, hits: 0 };
        } else if window.hits >= self.max_requests {
            return Err(self.length - elapsed);
        }

        window.hits += 1;
        Ok(())
    }
}

/// Answers 429 with a `Retry-After` header once an account runs over its limit
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let user_id = session_token(request.headers())
        .and_then(|token| state.session_manager.validate_session(token).ok());

    if let Some(user_id) = user_id {
        if let Err(wait) = state.rate_limiter.hit(user_id) {
            let seconds = wait.as_secs().max(1);
            tracing::warn!("Rate limit hit for user {}", user_id);

            let mut response = ApiError::TooManyRequests(format!(
                "Too many requests. Try again in {} seconds",
                seconds
            ))
            .into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
            return response;
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_applies_per_account() {
        let limiter = RateLimiter::new(2, 60);
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(limiter.hit(alice).is_ok());
        assert!(limiter.hit(alice).is_ok());
        let wait = limiter.hit(alice).unwrap_err();
        assert!(wait <= Duration::from_secs(60));

        assert!(limiter.hit(bob).is_ok());
    }

    #[test]
    fn test_elapsed_window_starts_over() {
        let limiter = RateLimiter::new(1, 0);
        let user = Uuid::new_v4();
        assert!(limiter.hit(user).is_ok());
        assert!(limiter.hit(user).is_ok());
    }
}
