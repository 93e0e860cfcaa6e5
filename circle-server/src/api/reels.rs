use axum::{
    extract::{Path, Query, State},
    Json,
};
use circle_types::{
    ActionResponse, Comment, ContentKind, CountResponse, CreateCommentRequest, CreateReelRequest,
    Reel, ToggleResponse,
};
use uuid::Uuid;

use super::engagement;
use super::notify::notify_mentions;
use super::posts::MEDIA_URL_MAX_LEN;
use super::{ApiError, ApiResult, Pagination};
use crate::auth::{AuthUser, OptionalUser};
use crate::db::repositories::{Engagement, ReelRepository};
use crate::state::AppState;
use crate::validation::{parse_visibility, validate_optional_text, validate_text, COMMENT_MAX_LEN};

/// GET /reels - Every reel the viewer may see, newest first
pub async fn get_reels(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Reel>>> {
    let reels = ReelRepository::new(state.db.pool.clone()).list(
        viewer.id().as_ref(),
        page.limit(),
        page.offset(),
    )?;
    Ok(Json(reels))
}

/// POST /reels - Publish a reel
pub async fn create_reel(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateReelRequest>,
) -> ApiResult<Json<Reel>> {
    let video_url = validate_text("Video URL", &payload.video_url, MEDIA_URL_MAX_LEN)?;
    let caption = validate_optional_text("Caption", payload.caption.as_deref(), COMMENT_MAX_LEN)?;
    let visibility = parse_visibility(payload.visibility.as_deref())?;

    let repo = ReelRepository::new(state.db.pool.clone());
    let reel_id = repo.create(&auth.id(), video_url, caption.as_deref(), visibility)?;
    let reel = repo
        .get_visible(&reel_id, Some(&auth.id()))?
        .ok_or_else(|| ApiError::InternalError("Created reel could not be read back".to_string()))?;

    if let Some(caption) = caption.as_deref() {
        notify_mentions(&state, &auth.user, caption, "reel");
    }

    Ok(Json(reel))
}

/// GET /reels/:id
pub async fn get_reel(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Path(reel_id): Path<Uuid>,
) -> ApiResult<Json<Reel>> {
    let reel = ReelRepository::new(state.db.pool.clone())
        .get_visible(&reel_id, viewer.id().as_ref())?
        .ok_or_else(|| ApiError::not_found("Reel"))?;
    Ok(Json(reel))
}

/// DELETE /reels/:id - Delete a reel (author only)
pub async fn delete_reel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(reel_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = ReelRepository::new(state.db.pool.clone());
    let owner = repo
        .get_owner(&reel_id)?
        .ok_or_else(|| ApiError::not_found("Reel"))?;
    if owner != auth.id() {
        return Err(ApiError::forbidden("You can only delete your own reels"));
    }

    repo.delete(&reel_id)?;
    Ok(Json(ActionResponse::ok("Reel deleted")))
}

/// POST /reels/:id/like
pub async fn like_reel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(reel_id): Path<Uuid>,
) -> ApiResult<Json<ToggleResponse>> {
    engagement::toggle(&state, &auth.user, ContentKind::Reel, Engagement::Like, &reel_id)
}

/// POST /reels/:id/save
pub async fn save_reel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(reel_id): Path<Uuid>,
) -> ApiResult<Json<ToggleResponse>> {
    engagement::toggle(&state, &auth.user, ContentKind::Reel, Engagement::Save, &reel_id)
}

/// POST /reels/:id/share
pub async fn share_reel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(reel_id): Path<Uuid>,
) -> ApiResult<Json<ToggleResponse>> {
    engagement::toggle(&state, &auth.user, ContentKind::Reel, Engagement::Share, &reel_id)
}

/// POST /reels/:id/view - Count a play; every call counts
pub async fn view_reel(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Path(reel_id): Path<Uuid>,
) -> ApiResult<Json<CountResponse>> {
    let repo = ReelRepository::new(state.db.pool.clone());
    if repo.get_visible(&reel_id, viewer.id().as_ref())?.is_none() {
        return Err(ApiError::not_found("Reel"));
    }

    let count = repo.record_view(&reel_id)?;
    Ok(Json(CountResponse {
        success: true,
        count,
    }))
}

/// GET /reels/:id/comments
pub async fn get_comments(
    State(state): State<AppState>,
    viewer: OptionalUser,
    Path(reel_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Comment>>> {
    engagement::list_comments(&state, ContentKind::Reel, &reel_id, viewer.id().as_ref())
}

/// POST /reels/:id/comments
pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(reel_id): Path<Uuid>,
    Json(payload): Json<CreateCommentRequest>,
) -> ApiResult<Json<Comment>> {
    engagement::add_comment(&state, &auth.user, ContentKind::Reel, &reel_id, payload)
}
