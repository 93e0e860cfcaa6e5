use axum::{
    extract::{Path, Query, State},
    Json,
};
use circle_types::{
    ActionResponse, Comment, ContentKind, CreateCommentRequest, CreatePostRequest, Post,
    ToggleResponse, UpdatePostRequest,
};
use uuid::Uuid;

use super::engagement;
use super::notify::notify_mentions;
use super::{ApiError, ApiResult, Pagination};
use crate::auth::{AuthUser, OptionalUser};
use crate::db::repositories::{Engagement, PostRepository};
use crate::state::AppState;
use crate::validation::{parse_visibility, validate_optional_text, validate_text, POST_MAX_LEN};

pub(crate) const MEDIA_URL_MAX_LEN: usize = 500;

/// GET /posts/feed - Posts from the caller and the people they follow
pub async fn get_feed(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Post>>> {
    let posts =
        PostRepository::new(state.db.pool.clone()).feed(&auth.id(), page.limit(), page.offset())?;
    Ok(Json(posts))
}

/// POST /posts - Create a new post
pub async fn create_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> ApiResult<Json<Post>> {
    let content = validate_text("Post", &payload.content, POST_MAX_LEN)?;
    let media_url =
        validate_optional_text("Media URL", payload.media_url.as_deref(), MEDIA_URL_MAX_LEN)?;
    let visibility = parse_visibility(payload.visibility.as_deref())?;

    let repo = PostRepository::new(state.db.pool.clone());
    let post_id = repo.create(&auth.id(), content, media_url.as_deref(), visibility)?;
    let post = repo
        .get_visible(&post_id, Some(&auth.id()))?
        .ok_or_else(|| ApiError::InternalError("Created post could not be read back".to_string()))?;

    notify_mentions(&state, &auth.user, content, "post");

    Ok(Json(post))
}

/// GET /posts/:id - A single post, if the viewer may see it
pub async fn get_post(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Post>> {
    let post = PostRepository::new(state.db.pool.clone())
        .get_visible(&post_id, viewer.id().as_ref())?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    Ok(Json(post))
}

/// PUT /posts/:id - Edit a post (author only)
///
/// Absent fields keep their value; an empty `media_url` removes the media.
pub async fn update_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> ApiResult<Json<Post>> {
    let repo = PostRepository::new(state.db.pool.clone());
    let current = repo
        .get_visible(&post_id, Some(&auth.id()))?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    if current.author_id != auth.id() {
        return Err(ApiError::forbidden("You can only edit your own posts"));
    }

    let content = match payload.content.as_deref() {
        Some(text) => validate_text("Post", text, POST_MAX_LEN)?.to_string(),
        None => current.content,
    };
    let media_url = match payload.media_url.as_deref() {
        Some(url) => validate_optional_text("Media URL", Some(url), MEDIA_URL_MAX_LEN)?,
        None => current.media_url,
    };
    let visibility = match payload.visibility.as_deref() {
        Some(raw) => parse_visibility(Some(raw))?,
        None => current.visibility,
    };

    repo.update(&post_id, &content, media_url.as_deref(), visibility)?;
    let post = repo
        .get_visible(&post_id, Some(&auth.id()))?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    Ok(Json(post))
}

/// DELETE /posts/:id - Delete a post with its comments and engagement
pub async fn delete_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = PostRepository::new(state.db.pool.clone());
    let owner = repo
        .get_owner(&post_id)?
        .ok_or_else(|| ApiError::not_found("Post"))?;
    if owner != auth.id() {
        return Err(ApiError::forbidden("You can only delete your own posts"));
    }

    repo.delete(&post_id)?;
    Ok(Json(ActionResponse::ok("Post deleted")))
}

/// POST /posts/:id/like - Toggle a like
pub async fn like_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<ToggleResponse>> {
    engagement::toggle(&state, &auth.user, ContentKind::Post, Engagement::Like, &post_id)
}

/// POST /posts/:id/save - Toggle a bookmark
pub async fn save_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<ToggleResponse>> {
    engagement::toggle(&state, &auth.user, ContentKind::Post, Engagement::Save, &post_id)
}

/// POST /posts/:id/share - Toggle a share
pub async fn share_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<ToggleResponse>> {
    engagement::toggle(&state, &auth.user, ContentKind::Post, Engagement::Share, &post_id)
}

/// GET /posts/saved - Posts the caller saved
pub async fn get_saved_posts(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Post>>> {
    let posts = PostRepository::new(state.db.pool.clone()).list_saved(
        &auth.id(),
        page.limit(),
        page.offset(),
    )?;
    Ok(Json(posts))
}

/// GET /posts/:id/comments
pub async fn get_comments(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Comment>>> {
    engagement::list_comments(&state, ContentKind::Post, &post_id, viewer.id().as_ref())
}

/// POST /posts/:id/comments
pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<CreateCommentRequest>,
) -> ApiResult<Json<Comment>> {
    engagement::add_comment(&state, &auth.user, ContentKind::Post, &post_id, payload)
}
