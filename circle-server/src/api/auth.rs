use axum::{extract::State, Json};
use circle_types::{
    ActionResponse, ChangePasswordRequest, LoginRequest, LoginResponse, RecoverAccountRequest,
    RecoverAccountResponse, RegisterRequest, RegisterResponse, User,
};

use super::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::db::repositories::UserRepository;
use crate::password::{generate_recovery_key, hash_password_blocking, verify_password_blocking};
use crate::state::AppState;
use crate::validation::{validate_optional_text, validate_password, validate_username};

const DISPLAY_NAME_MAX_LEN: usize = 50;
pub(crate) const USERNAME_TAKEN: &str = "Username already taken";

/// POST /auth/register - Create an account and log it in
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let username = payload.username.trim();
    validate_username(username)?;
    validate_password(&payload.password, state.settings.auth.min_password_length)?;
    let display_name = validate_optional_text(
        "Display name",
        payload.display_name.as_deref(),
        DISPLAY_NAME_MAX_LEN,
    )?;

    let repo = UserRepository::new(state.db.pool.clone());
    if repo.get_by_username(username)?.is_some() {
        return Err(ApiError::Conflict(USERNAME_TAKEN.to_string()));
    }

    let password_hash = hash_password_blocking(payload.password).await?;
    let recovery_key = generate_recovery_key();
    let user = repo
        .create(username, &password_hash, &recovery_key, display_name.as_deref())
        .map_err(|e| ApiError::conflict_on_constraint(e, USERNAME_TAKEN))?;
    let session_token = state.session_manager.create_session(user.id)?;

    tracing::info!("Registered user {}", user.username);

    Ok(Json(RegisterResponse {
        success: true,
        message: "Account created".to_string(),
        user,
        session_token,
        recovery_key,
    }))
}

/// POST /auth/login - Exchange username and password for a session token
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid username or password".to_string());

    let repo = UserRepository::new(state.db.pool.clone());
    let (user, hash) = repo
        .get_credentials(payload.username.trim())?
        .ok_or_else(invalid)?;

    if !verify_password_blocking(payload.password, hash).await? {
        return Err(invalid());
    }
    if user.is_banned {
        return Err(ApiError::forbidden("Account is banned"));
    }

    let session_token = state.session_manager.create_session(user.id)?;

    Ok(Json(LoginResponse {
        success: true,
        message: "Logged in".to_string(),
        user,
        session_token,
    }))
}

/// POST /auth/logout - End the current session
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<ActionResponse>> {
    state.session_manager.delete_session(&auth.token)?;
    Ok(Json(ActionResponse::ok("Logged out successfully")))
}

/// GET /auth/me - The account behind the session token
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

/// POST /auth/recover - Reset a forgotten password with the recovery key
///
/// The key is single use: a fresh one is returned and every existing session
/// of the account is revoked.
pub async fn recover(
    State(state): State<AppState>,
    Json(payload): Json<RecoverAccountRequest>,
) -> ApiResult<Json<RecoverAccountResponse>> {
    validate_password(&payload.new_password, state.settings.auth.min_password_length)?;

    let repo = UserRepository::new(state.db.pool.clone());
    let user = repo
        .find_by_recovery_key(payload.username.trim(), payload.recovery_key.trim())?
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or recovery key".to_string()))?;

    let password_hash = hash_password_blocking(payload.new_password).await?;
    let recovery_key = generate_recovery_key();
    repo.reset_password(&user.id, &password_hash, &recovery_key)?;
    let revoked = state.session_manager.delete_user_sessions(&user.id)?;

    tracing::info!(
        "Recovered account {} ({} sessions revoked)",
        user.username,
        revoked
    );

    Ok(Json(RecoverAccountResponse {
        success: true,
        message: "Password reset. Store the new recovery key safely".to_string(),
        recovery_key,
    }))
}

/// POST /auth/password - Change password, given the current one
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Json<ActionResponse>> {
    validate_password(&payload.new_password, state.settings.auth.min_password_length)?;

    let repo = UserRepository::new(state.db.pool.clone());
    let hash = repo
        .get_password_hash(&auth.id())?
        .ok_or_else(ApiError::unauthenticated)?;

    if !verify_password_blocking(payload.current_password, hash).await? {
        return Err(ApiError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = hash_password_blocking(payload.new_password).await?;
    repo.update_password(&auth.id(), &new_hash)?;

    Ok(Json(ActionResponse::ok("Password updated")))
}
