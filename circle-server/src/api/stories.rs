use axum::{
    extract::{Path, State},
    Json,
};
use circle_types::{
    ActionResponse, CountResponse, CreateStoryRequest, Story, StoryViewer, User,
};
use uuid::Uuid;

use super::posts::MEDIA_URL_MAX_LEN;
use super::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::db::repositories::{FollowRepository, StoryRepository};
use crate::state::AppState;
use crate::validation::{validate_optional_text, validate_text, COMMENT_MAX_LEN};

/// A live story the caller may open. Blocks in either direction hide it.
fn open_story(state: &AppState, viewer: &User, story_id: &Uuid) -> ApiResult<Story> {
    let story = StoryRepository::new(state.db.pool.clone())
        .get_active(story_id, &viewer.id)?
        .ok_or_else(|| ApiError::not_found("Story"))?;

    if story.author_id != viewer.id
        && FollowRepository::new(state.db.pool.clone()).is_blocked_either(&viewer.id, &story.author_id)?
    {
        return Err(ApiError::not_found("Story"));
    }
    Ok(story)
}

/// GET /stories - Live stories from the caller and the people they follow
pub async fn get_stories(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Story>>> {
    let stories = StoryRepository::new(state.db.pool.clone()).list_active(&auth.id())?;
    Ok(Json(stories))
}

/// POST /stories - Post a story that expires after the configured ttl
pub async fn create_story(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateStoryRequest>,
) -> ApiResult<Json<Story>> {
    let media_url = validate_text("Media URL", &payload.media_url, MEDIA_URL_MAX_LEN)?;
    let caption = validate_optional_text("Caption", payload.caption.as_deref(), COMMENT_MAX_LEN)?;
    let ttl = chrono::Duration::hours(state.settings.stories.ttl_hours);

    let repo = StoryRepository::new(state.db.pool.clone());
    let story_id = repo.create(&auth.id(), media_url, caption.as_deref(), ttl)?;
    let story = repo
        .get_active(&story_id, &auth.id())?
        .ok_or_else(|| ApiError::InternalError("Created story could not be read back".to_string()))?;

    Ok(Json(story))
}

/// GET /stories/:id
pub async fn get_story(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(story_id): Path<Uuid>,
) -> ApiResult<Json<Story>> {
    Ok(Json(open_story(&state, &auth.user, &story_id)?))
}

/// DELETE /stories/:id - Delete a story (author only)
pub async fn delete_story(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(story_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = StoryRepository::new(state.db.pool.clone());
    let owner = repo
        .get_owner(&story_id)?
        .ok_or_else(|| ApiError::not_found("Story"))?;
    if owner != auth.id() {
        return Err(ApiError::forbidden("You can only delete your own stories"));
    }

    repo.delete(&story_id)?;
    Ok(Json(ActionResponse::ok("Story deleted")))
}

/// POST /stories/:id/view - Mark a story as seen; each viewer counts once
pub async fn view_story(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(story_id): Path<Uuid>,
) -> ApiResult<Json<CountResponse>> {
    let story = open_story(&state, &auth.user, &story_id)?;

    // authors looking at their own story don't count
    let count = if story.author_id == auth.id() {
        story.views_count
    } else {
        let (_, count) =
            StoryRepository::new(state.db.pool.clone()).record_view(&story_id, &auth.id())?;
        count
    };

    Ok(Json(CountResponse {
        success: true,
        count,
    }))
}

/// GET /stories/:id/viewers - Who saw the story (author only)
pub async fn get_story_viewers(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(story_id): Path<Uuid>,
) -> ApiResult<Json<Vec<StoryViewer>>> {
    let repo = StoryRepository::new(state.db.pool.clone());
    let owner = repo
        .get_owner(&story_id)?
        .ok_or_else(|| ApiError::not_found("Story"))?;
    if owner != auth.id() {
        return Err(ApiError::forbidden("Only the author can see who viewed a story"));
    }

    Ok(Json(repo.viewers(&story_id)?))
}
