use axum::{
    extract::{Path, State},
    Json,
};
use circle_types::{ActionResponse, FriendRequest, NotificationKind, SendFriendRequest, User};
use uuid::Uuid;

use super::friends::require_user;
use super::notify::notify;
use super::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::db::repositories::{FollowRepository, FriendRequestRepository};
use crate::state::AppState;

fn not_pending() -> ApiError {
    ApiError::Conflict("Friend request is no longer pending".to_string())
}

fn accept_and_notify(
    state: &AppState,
    repo: &FriendRequestRepository,
    request: &FriendRequest,
    receiver: &User,
) -> ApiResult<()> {
    if !repo.accept(&request.id)? {
        return Err(not_pending());
    }
    let content = format!("{} accepted your friend request", receiver.username);
    notify(
        state,
        &request.sender_id,
        receiver,
        NotificationKind::FriendAccepted,
        &content,
    );
    Ok(())
}

/// POST /friend-requests - Ask another user to be friends
///
/// When the other user already asked the caller, their request is accepted
/// instead and returned in its accepted state.
pub async fn send_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SendFriendRequest>,
) -> ApiResult<Json<FriendRequest>> {
    let receiver_id = payload.receiver_id;
    if receiver_id == auth.id() {
        return Err(ApiError::BadRequest(
            "You cannot send a friend request to yourself".to_string(),
        ));
    }
    require_user(&state, &receiver_id)?;

    let follows = FollowRepository::new(state.db.pool.clone());
    if follows.is_blocked_either(&auth.id(), &receiver_id)? {
        return Err(ApiError::forbidden("Cannot send a friend request to this user"));
    }
    if follows.are_friends(&auth.id(), &receiver_id)? {
        return Err(ApiError::Conflict("You are already friends".to_string()));
    }

    let repo = FriendRequestRepository::new(state.db.pool.clone());
    if repo.find_pending(&auth.id(), &receiver_id)?.is_some() {
        return Err(ApiError::Conflict("Friend request already sent".to_string()));
    }

    if let Some(reverse) = repo.find_pending(&receiver_id, &auth.id())? {
        accept_and_notify(&state, &repo, &reverse, &auth.user)?;
        let accepted = repo
            .get(&reverse.id)?
            .ok_or_else(|| ApiError::not_found("Friend request"))?;
        return Ok(Json(accepted));
    }

    let request = repo.create(&auth.id(), &receiver_id)?;
    let content = format!("{} sent you a friend request", auth.user.username);
    notify(
        &state,
        &receiver_id,
        &auth.user,
        NotificationKind::FriendRequest,
        &content,
    );

    Ok(Json(request))
}

/// GET /friend-requests/incoming - Pending requests addressed to the caller
pub async fn get_incoming(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<FriendRequest>>> {
    let requests = FriendRequestRepository::new(state.db.pool.clone()).incoming(&auth.id())?;
    Ok(Json(requests))
}

/// GET /friend-requests/outgoing - Pending requests the caller sent
pub async fn get_outgoing(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<FriendRequest>>> {
    let requests = FriendRequestRepository::new(state.db.pool.clone()).outgoing(&auth.id())?;
    Ok(Json(requests))
}

/// POST /friend-requests/:id/accept
pub async fn accept_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = FriendRequestRepository::new(state.db.pool.clone());
    let request = repo
        .get(&request_id)?
        .ok_or_else(|| ApiError::not_found("Friend request"))?;
    if request.receiver_id != auth.id() {
        return Err(ApiError::forbidden("Only the recipient can accept this request"));
    }

    accept_and_notify(&state, &repo, &request, &auth.user)?;
    Ok(Json(ActionResponse::ok("Friend request accepted")))
}

/// POST /friend-requests/:id/decline
pub async fn decline_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = FriendRequestRepository::new(state.db.pool.clone());
    let request = repo
        .get(&request_id)?
        .ok_or_else(|| ApiError::not_found("Friend request"))?;
    if request.receiver_id != auth.id() {
        return Err(ApiError::forbidden("Only the recipient can decline this request"));
    }

    if !repo.decline(&request_id)? {
        return Err(not_pending());
    }
    Ok(Json(ActionResponse::ok("Friend request declined")))
}

/// DELETE /friend-requests/:id - Withdraw a request the caller sent
pub async fn cancel_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = FriendRequestRepository::new(state.db.pool.clone());
    let request = repo
        .get(&request_id)?
        .ok_or_else(|| ApiError::not_found("Friend request"))?;
    if request.sender_id != auth.id() {
        return Err(ApiError::forbidden("Only the sender can cancel this request"));
    }

    if !repo.cancel(&request_id)? {
        return Err(not_pending());
    }
    Ok(Json(ActionResponse::ok("Friend request cancelled")))
}
