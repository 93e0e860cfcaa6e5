use axum::{
    extract::{Path, State},
    Json,
};
use circle_types::{
    ActionResponse, FollowResponse, FriendSuggestion, NotificationKind, UserSummary,
};
use uuid::Uuid;

use super::notify::notify;
use super::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::db::repositories::{FollowRepository, FollowToggle, UserRepository};
use crate::state::AppState;

const SUGGESTION_LIMIT: i64 = 10;

/// 404 unless `user_id` names an account
pub(crate) fn require_user(state: &AppState, user_id: &Uuid) -> ApiResult<()> {
    UserRepository::new(state.db.pool.clone())
        .get_by_id(user_id)?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(())
}

/// POST /users/:id/follow - Follow, or unfollow when already following
pub async fn toggle_follow(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target_id): Path<Uuid>,
) -> ApiResult<Json<FollowResponse>> {
    if target_id == auth.id() {
        return Err(ApiError::BadRequest("You cannot follow yourself".to_string()));
    }
    require_user(&state, &target_id)?;

    let repo = FollowRepository::new(state.db.pool.clone());
    let following = match repo.toggle_follow(&auth.id(), &target_id)? {
        FollowToggle::Blocked => return Err(ApiError::forbidden("Cannot follow this user")),
        FollowToggle::Followed => {
            let content = format!("{} started following you", auth.user.username);
            notify(&state, &target_id, &auth.user, NotificationKind::Follow, &content);
            true
        }
        FollowToggle::Unfollowed => false,
    };

    let message = if following { "Followed" } else { "Unfollowed" };
    Ok(Json(FollowResponse {
        success: true,
        message: message.to_string(),
        following,
        follower_count: repo.follower_count(&target_id)?,
    }))
}

/// POST /users/:id/block
pub async fn block_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    if target_id == auth.id() {
        return Err(ApiError::BadRequest("You cannot block yourself".to_string()));
    }
    require_user(&state, &target_id)?;

    FollowRepository::new(state.db.pool.clone()).block(&auth.id(), &target_id)?;
    Ok(Json(ActionResponse::ok("User blocked")))
}

/// DELETE /users/:id/block
pub async fn unblock_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    if !FollowRepository::new(state.db.pool.clone()).unblock(&auth.id(), &target_id)? {
        return Err(ApiError::NotFound("User is not blocked".to_string()));
    }
    Ok(Json(ActionResponse::ok("User unblocked")))
}

/// GET /social/blocked - Users the caller has blocked
pub async fn get_blocked_list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let users = FollowRepository::new(state.db.pool.clone()).blocked_users(&auth.id())?;
    Ok(Json(users))
}

/// GET /users/:id/followers
pub async fn get_followers_list(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    require_user(&state, &user_id)?;
    let users = FollowRepository::new(state.db.pool.clone()).followers(&user_id)?;
    Ok(Json(users))
}

/// GET /users/:id/following
pub async fn get_following_list(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    require_user(&state, &user_id)?;
    let users = FollowRepository::new(state.db.pool.clone()).following(&user_id)?;
    Ok(Json(users))
}

/// GET /social/friends - Users who follow the caller back
pub async fn get_friends_list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let users = FollowRepository::new(state.db.pool.clone()).friends(&auth.id())?;
    Ok(Json(users))
}

/// GET /users/:id/mutual - Friends the caller shares with another user
pub async fn get_mutual_friends_list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(other_id): Path<Uuid>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    require_user(&state, &other_id)?;
    let users = FollowRepository::new(state.db.pool.clone()).mutual_friends(&auth.id(), &other_id)?;
    Ok(Json(users))
}

/// GET /social/suggestions - Friends of friends, most shared connections first
pub async fn get_suggestions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<FriendSuggestion>>> {
    let suggestions =
        FollowRepository::new(state.db.pool.clone()).suggestions(&auth.id(), SUGGESTION_LIMIT)?;
    Ok(Json(suggestions))
}
