//! Session-token extractors for handlers.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use circle_types::User;
use uuid::Uuid;

use crate::api::{ApiError, ApiResult};
use crate::db::repositories::UserRepository;
use crate::state::AppState;

pub const SESSION_HEADER: &str = "X-Session-Token";

pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

/// Resolve a token to a live, non-banned account
fn resolve_user(state: &AppState, token: &str) -> ApiResult<User> {
    let user_id = state
        .session_manager
        .validate_session(token)
        .map_err(|_| ApiError::unauthenticated())?;

    let user = UserRepository::new(state.db.pool.clone())
        .get_by_id(&user_id)?
        .ok_or_else(ApiError::unauthenticated)?;

    if user.is_banned {
        return Err(ApiError::forbidden("Account is banned"));
    }
    Ok(user)
}

/// Authenticated user from the `X-Session-Token` header.
///
/// Add this as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or_else(ApiError::unauthenticated)?;
        let user = resolve_user(state, token)?;
        Ok(AuthUser {
            user,
            token: token.to_string(),
        })
    }
}

/// The caller when a valid session is present; public endpoints take this.
pub struct OptionalUser(pub Option<User>);

impl OptionalUser {
    pub fn id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|u| u.id)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(&parts.headers) else {
            return Ok(OptionalUser(None));
        };
        match resolve_user(state, token) {
            Ok(user) => Ok(OptionalUser(Some(user))),
            Err(ApiError::InternalError(msg)) => Err(ApiError::InternalError(msg)),
            Err(_) => Ok(OptionalUser(None)),
        }
    }
}

/// An authenticated administrator
pub struct AdminUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        if !auth.user.is_admin {
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(AdminUser(auth.user))
    }
}
