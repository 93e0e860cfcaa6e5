use axum::{
    extract::{Path, Query, State},
    Json,
};
use circle_types::{
    ActionResponse, Conversation, CountResponse, DirectMessage, NotificationKind,
    SendMessageRequest,
};
use uuid::Uuid;

use super::friends::require_user;
use super::notify::notify;
use super::{ApiError, ApiResult, Pagination};
use crate::auth::AuthUser;
use crate::db::repositories::{FollowRepository, MessageRepository};
use crate::state::AppState;
use crate::validation::{validate_text, MESSAGE_MAX_LEN};

/// GET /messages/conversations - One entry per conversation partner
pub async fn get_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Conversation>>> {
    let conversations = MessageRepository::new(state.db.pool.clone()).conversations(&auth.id())?;
    Ok(Json(conversations))
}

/// GET /messages/unread-count
pub async fn get_unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<CountResponse>> {
    let count = MessageRepository::new(state.db.pool.clone()).unread_count(&auth.id())?;
    Ok(Json(CountResponse {
        success: true,
        count,
    }))
}

/// GET /messages/:user_id - Messages with another user, oldest first
pub async fn get_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(other_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<DirectMessage>>> {
    require_user(&state, &other_id)?;
    let messages = MessageRepository::new(state.db.pool.clone()).conversation(
        &auth.id(),
        &other_id,
        page.limit(),
        page.offset(),
    )?;
    Ok(Json(messages))
}

/// POST /messages - Send a direct message
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<Json<DirectMessage>> {
    let content = validate_text("Message", &payload.content, MESSAGE_MAX_LEN)?;
    let receiver_id = payload.receiver_id;
    if receiver_id == auth.id() {
        return Err(ApiError::BadRequest(
            "You cannot send a message to yourself".to_string(),
        ));
    }
    require_user(&state, &receiver_id)?;

    if FollowRepository::new(state.db.pool.clone()).is_blocked_either(&auth.id(), &receiver_id)? {
        return Err(ApiError::forbidden("Cannot send messages to this user"));
    }

    let message = MessageRepository::new(state.db.pool.clone()).send(&auth.id(), &receiver_id, content)?;
    let note = format!("New message from {}", auth.user.username);
    notify(&state, &receiver_id, &auth.user, NotificationKind::Message, &note);

    Ok(Json(message))
}

/// POST /messages/:user_id/read - Mark everything from that user as read
pub async fn mark_messages_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(other_id): Path<Uuid>,
) -> ApiResult<Json<CountResponse>> {
    let count = MessageRepository::new(state.db.pool.clone()).mark_read(&auth.id(), &other_id)?;
    Ok(Json(CountResponse {
        success: true,
        count: count as i64,
    }))
}

/// DELETE /messages/item/:id - Delete a message the caller sent
pub async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = MessageRepository::new(state.db.pool.clone());
    let message = repo
        .get(&message_id)?
        .ok_or_else(|| ApiError::not_found("Message"))?;
    if message.sender_id != auth.id() {
        return Err(ApiError::forbidden("You can only delete messages you sent"));
    }

    repo.delete(&message_id)?;
    Ok(Json(ActionResponse::ok("Message deleted")))
}
