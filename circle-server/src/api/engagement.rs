//! Likes, saves, shares and comments, shared by posts and reels.

use axum::{
    extract::{Path, State},
    Json,
};
use circle_types::{
    ActionResponse, Comment, ContentKind, CreateCommentRequest, NotificationKind, ToggleResponse,
    User,
};
use uuid::Uuid;

use super::notify::{notify, notify_mentions};
use super::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::db::repositories::{Engagement, EngagementRepository, PostRepository, ReelRepository};
use crate::state::AppState;
use crate::validation::{validate_text, COMMENT_MAX_LEN};

fn label(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Post => "Post",
        ContentKind::Reel => "Reel",
    }
}

/// Owner of a post or reel the viewer is allowed to see
pub(crate) fn visible_owner(
    state: &AppState,
    kind: ContentKind,
    content_id: &Uuid,
    viewer: Option<&Uuid>,
) -> ApiResult<Uuid> {
    let pool = state.db.pool.clone();
    let owner = match kind {
        ContentKind::Post => PostRepository::new(pool)
            .get_visible(content_id, viewer)?
            .map(|p| p.author_id),
        ContentKind::Reel => ReelRepository::new(pool)
            .get_visible(content_id, viewer)?
            .map(|r| r.author_id),
    };
    owner.ok_or_else(|| ApiError::not_found(label(kind)))
}

fn owner_of(state: &AppState, kind: ContentKind, content_id: &Uuid) -> ApiResult<Option<Uuid>> {
    let pool = state.db.pool.clone();
    let owner = match kind {
        ContentKind::Post => PostRepository::new(pool).get_owner(content_id)?,
        ContentKind::Reel => ReelRepository::new(pool).get_owner(content_id)?,
    };
    Ok(owner)
}

/// Flip a like/save/share and notify the owner when it was switched on
pub(crate) fn toggle(
    state: &AppState,
    actor: &User,
    kind: ContentKind,
    engagement: Engagement,
    content_id: &Uuid,
) -> ApiResult<Json<ToggleResponse>> {
    let owner = visible_owner(state, kind, content_id, Some(&actor.id))?;
    let (active, count) = EngagementRepository::new(state.db.pool.clone()).toggle(
        kind,
        engagement,
        content_id,
        &actor.id,
    )?;

    let noun = label(kind).to_lowercase();
    let verb = match (engagement, active) {
        (Engagement::Like, true) => "liked",
        (Engagement::Like, false) => "unliked",
        (Engagement::Save, true) => "saved",
        (Engagement::Save, false) => "unsaved",
        (Engagement::Share, true) => "shared",
        (Engagement::Share, false) => "unshared",
    };

    if active {
        let kind_tag = match engagement {
            Engagement::Like => Some(NotificationKind::Like),
            Engagement::Share => Some(NotificationKind::Share),
            Engagement::Save => None,
        };
        if let Some(kind_tag) = kind_tag {
            let content = format!("{} {} your {}", actor.username, verb, noun);
            notify(state, &owner, actor, kind_tag, &content);
        }
    }

    Ok(Json(ToggleResponse {
        success: true,
        message: format!("{} {}", label(kind), verb),
        active,
        count,
    }))
}

pub(crate) fn list_comments(
    state: &AppState,
    kind: ContentKind,
    content_id: &Uuid,
    viewer: Option<&Uuid>,
) -> ApiResult<Json<Vec<Comment>>> {
    visible_owner(state, kind, content_id, viewer)?;
    let comments =
        EngagementRepository::new(state.db.pool.clone()).list_comments(kind, content_id)?;
    Ok(Json(comments))
}

pub(crate) fn add_comment(
    state: &AppState,
    author: &User,
    kind: ContentKind,
    content_id: &Uuid,
    payload: CreateCommentRequest,
) -> ApiResult<Json<Comment>> {
    let text = validate_text("Comment", &payload.content, COMMENT_MAX_LEN)?;
    let owner = visible_owner(state, kind, content_id, Some(&author.id))?;

    let comment = EngagementRepository::new(state.db.pool.clone()).add_comment(
        kind,
        content_id,
        &author.id,
        text,
    )?;

    let noun = label(kind).to_lowercase();
    notify(
        state,
        &owner,
        author,
        NotificationKind::Comment,
        &format!("{} commented on your {}", author.username, noun),
    );
    notify_mentions(state, author, text, "comment");

    Ok(Json(comment))
}

/// DELETE /comments/:id - Remove a comment
///
/// Allowed for the comment's author, the owner of the post or reel, and admins.
pub async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = EngagementRepository::new(state.db.pool.clone());
    let comment = repo
        .get_comment(&comment_id)?
        .ok_or_else(|| ApiError::not_found("Comment"))?;

    let content_owner = owner_of(&state, comment.content_kind, &comment.content_id)?;
    let allowed = comment.author_id == auth.id()
        || content_owner == Some(auth.id())
        || auth.user.is_admin;
    if !allowed {
        return Err(ApiError::forbidden(
            "You can only delete your own comments or comments on your content",
        ));
    }

    repo.delete_comment(&comment)?;
    Ok(Json(ActionResponse::ok("Comment deleted")))
}
