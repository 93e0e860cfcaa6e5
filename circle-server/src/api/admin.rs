//! Moderation endpoints. Every handler requires an admin session.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use circle_types::{
    ActionResponse, NotificationKind, SetAdminRequest, SupportTicket, TicketStatus,
    UpdateTicketStatusRequest, User,
};
use serde::Deserialize;
use uuid::Uuid;

use super::notify::notify;
use super::{ApiError, ApiResult, Pagination};
use crate::auth::AdminUser;
use crate::db::repositories::{
    PostRepository, ReelRepository, StoryRepository, SupportRepository, UserRepository,
};
use crate::state::AppState;

fn parse_status(raw: &str) -> ApiResult<TicketStatus> {
    TicketStatus::parse(raw).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Invalid status '{}'. Use 'open', 'in_progress' or 'closed'",
            raw
        ))
    })
}

fn removed(rows: usize, what: &str) -> ApiResult<Json<ActionResponse>> {
    if rows == 0 {
        return Err(ApiError::not_found(what));
    }
    Ok(Json(ActionResponse::ok(format!("{} removed", what))))
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<User>>> {
    let users = UserRepository::new(state.db.pool.clone()).list_all(page.limit(), page.offset())?;
    Ok(Json(users))
}

/// POST /admin/users/:id/ban - Ban an account and end its sessions
pub async fn ban_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    if user_id == admin.id {
        return Err(ApiError::BadRequest("You cannot ban yourself".to_string()));
    }
    if UserRepository::new(state.db.pool.clone()).set_banned(&user_id, true)? == 0 {
        return Err(ApiError::not_found("User"));
    }

    let revoked = state.session_manager.delete_user_sessions(&user_id)?;
    tracing::info!(
        "{} banned user {} ({} sessions revoked)",
        admin.username,
        user_id,
        revoked
    );

    Ok(Json(ActionResponse::ok("User banned")))
}

/// POST /admin/users/:id/unban
pub async fn unban_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    if UserRepository::new(state.db.pool.clone()).set_banned(&user_id, false)? == 0 {
        return Err(ApiError::not_found("User"));
    }
    tracing::info!("{} unbanned user {}", admin.username, user_id);
    Ok(Json(ActionResponse::ok("User unbanned")))
}

/// POST /admin/users/:id/admin - Grant or revoke admin rights
pub async fn set_user_admin(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<SetAdminRequest>,
) -> ApiResult<Json<ActionResponse>> {
    if user_id == admin.id {
        return Err(ApiError::BadRequest(
            "You cannot change your own admin status".to_string(),
        ));
    }
    if UserRepository::new(state.db.pool.clone()).set_admin(&user_id, payload.is_admin)? == 0 {
        return Err(ApiError::not_found("User"));
    }

    tracing::info!(
        "{} set admin={} for user {}",
        admin.username,
        payload.is_admin,
        user_id
    );
    let message = if payload.is_admin {
        "Admin rights granted"
    } else {
        "Admin rights revoked"
    };
    Ok(Json(ActionResponse::ok(message)))
}

/// DELETE /admin/posts/:id
pub async fn delete_post(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    removed(PostRepository::new(state.db.pool.clone()).delete(&post_id)?, "Post")
}

/// DELETE /admin/reels/:id
pub async fn delete_reel(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(reel_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    removed(ReelRepository::new(state.db.pool.clone()).delete(&reel_id)?, "Reel")
}

/// DELETE /admin/stories/:id
pub async fn delete_story(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(story_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    removed(StoryRepository::new(state.db.pool.clone()).delete(&story_id)?, "Story")
}

#[derive(Deserialize)]
pub struct TicketFilter {
    #[serde(default)]
    pub status: Option<String>,
}

/// GET /admin/tickets?status= - Support queue
pub async fn list_tickets(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<TicketFilter>,
) -> ApiResult<Json<Vec<SupportTicket>>> {
    let status = filter.status.as_deref().map(parse_status).transpose()?;
    let tickets = SupportRepository::new(state.db.pool.clone()).list_all(status)?;
    Ok(Json(tickets))
}

/// PUT /admin/tickets/:id/status
pub async fn update_ticket_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(ticket_id): Path<Uuid>,
    Json(payload): Json<UpdateTicketStatusRequest>,
) -> ApiResult<Json<ActionResponse>> {
    let status = parse_status(&payload.status)?;
    let repo = SupportRepository::new(state.db.pool.clone());
    let ticket = repo
        .get_ticket(&ticket_id)?
        .ok_or_else(|| ApiError::not_found("Ticket"))?;

    repo.set_status(&ticket_id, status)?;
    let note = format!(
        "Your ticket \"{}\" is now {}",
        ticket.subject,
        status.as_str().replace('_', " ")
    );
    notify(&state, &ticket.user_id, &admin, NotificationKind::Support, &note);

    Ok(Json(ActionResponse::ok("Ticket status updated")))
}
