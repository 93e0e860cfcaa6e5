use axum::{
    extract::{Path, Query, State},
    Json,
};
use circle_types::{
    ActionResponse, Post, Profile, ProfileView, Reel, RelationshipStatus, UpdateProfileRequest,
    UserSummary,
};
use serde::Deserialize;
use uuid::Uuid;

use super::auth::USERNAME_TAKEN;
use super::{ApiError, ApiResult, Pagination};
use crate::auth::{AuthUser, OptionalUser};
use crate::db::repositories::{
    FollowRepository, PostRepository, ProfileFields, ReelRepository, UserRepository,
};
use crate::state::AppState;
use crate::validation::{validate_optional_text, validate_username, BIO_MAX_LEN};

const SEARCH_LIMIT: i64 = 20;
const DISPLAY_NAME_MAX_LEN: usize = 50;
const LOCATION_MAX_LEN: usize = 100;
const URL_MAX_LEN: usize = 500;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /users/search?q= - Search users by username or display name
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<UserSummary>>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(ApiError::BadRequest(
            "Search query cannot be empty".to_string(),
        ));
    }

    let users = UserRepository::new(state.db.pool.clone()).search(q, SEARCH_LIMIT)?;
    Ok(Json(users))
}

/// GET /users/:id - Profile with counts and the viewer's relationship to it
pub async fn get_user(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ProfileView>> {
    let pool = state.db.pool.clone();
    let user_repo = UserRepository::new(pool.clone());
    let follow_repo = FollowRepository::new(pool.clone());
    let post_repo = PostRepository::new(pool);

    let user = user_repo
        .get_by_id(&user_id)?
        .filter(|u| !u.is_banned || viewer.0.as_ref().is_some_and(|v| v.is_admin))
        .ok_or_else(|| ApiError::not_found("User"))?;
    let profile = user_repo
        .get_profile(&user_id)?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let relationship = match viewer.id() {
        Some(viewer_id) => follow_repo.relationship(&viewer_id, &user_id)?,
        None => RelationshipStatus::None,
    };

    Ok(Json(ProfileView {
        profile,
        joined_at: user.created_at,
        follower_count: follow_repo.follower_count(&user_id)?,
        following_count: follow_repo.following_count(&user_id)?,
        post_count: post_repo.count_by_user(&user_id)?,
        relationship,
    }))
}

/// PUT /users/me - Update username and profile fields
///
/// Absent fields are left alone; an empty string clears a profile field.
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Profile>> {
    let repo = UserRepository::new(state.db.pool.clone());
    let user_id = auth.id();

    let username = payload.username.as_deref().map(str::trim);
    if let Some(username) = username {
        validate_username(username)?;
    }

    let current = repo
        .get_profile(&user_id)?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let mut fields = ProfileFields::from(&current);

    let edits = [
        (&payload.display_name, &mut fields.display_name, "Display name", DISPLAY_NAME_MAX_LEN),
        (&payload.bio, &mut fields.bio, "Bio", BIO_MAX_LEN),
        (&payload.avatar_url, &mut fields.avatar_url, "Avatar URL", URL_MAX_LEN),
        (&payload.location, &mut fields.location, "Location", LOCATION_MAX_LEN),
        (&payload.website, &mut fields.website, "Website", URL_MAX_LEN),
    ];
    for (requested, slot, field, max) in edits {
        if let Some(value) = requested {
            *slot = validate_optional_text(field, Some(value.as_str()), max)?;
        }
    }

    if let Some(username) = username {
        if repo.username_taken_by_other(username, &user_id)? {
            return Err(ApiError::Conflict(USERNAME_TAKEN.to_string()));
        }
    }
    repo.save_profile(&user_id, username, &fields)
        .map_err(|e| ApiError::conflict_on_constraint(e, USERNAME_TAKEN))?;

    let profile = repo
        .get_profile(&user_id)?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(profile))
}

/// DELETE /users/me - Delete the account and everything it owns
pub async fn delete_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<ActionResponse>> {
    UserRepository::new(state.db.pool.clone()).delete(&auth.id())?;
    tracing::info!("Deleted account {}", auth.user.username);
    Ok(Json(ActionResponse::ok("Account deleted")))
}

/// GET /users/:id/posts - A user's posts the viewer may see
pub async fn get_user_posts(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Path(user_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Post>>> {
    let posts = PostRepository::new(state.db.pool.clone()).list_by_user(
        &user_id,
        viewer.id().as_ref(),
        page.limit(),
        page.offset(),
    )?;
    Ok(Json(posts))
}

/// GET /users/:id/reels - A user's reels the viewer may see
pub async fn get_user_reels(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Path(user_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Reel>>> {
    let reels = ReelRepository::new(state.db.pool.clone()).list_by_user(
        &user_id,
        viewer.id().as_ref(),
        page.limit(),
        page.offset(),
    )?;
    Ok(Json(reels))
}
