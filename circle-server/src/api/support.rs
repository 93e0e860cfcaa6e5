use axum::{
    extract::{Path, State},
    Json,
};
use circle_types::{
    ActionResponse, CreateTicketRequest, NotificationKind, SupportTicket, TicketReplyRequest,
    TicketStatus, TicketThread, User,
};
use uuid::Uuid;

use super::notify::notify;
use super::{ApiError, ApiResult};
use crate::auth::AuthUser;
use crate::db::repositories::SupportRepository;
use crate::state::AppState;
use crate::validation::{validate_text, MESSAGE_MAX_LEN, SUBJECT_MAX_LEN};

/// A ticket the caller owns, or any ticket for admins
fn accessible_ticket(repo: &SupportRepository, ticket_id: &Uuid, user: &User) -> ApiResult<SupportTicket> {
    let ticket = repo
        .get_ticket(ticket_id)?
        .ok_or_else(|| ApiError::not_found("Ticket"))?;
    if ticket.user_id != user.id && !user.is_admin {
        return Err(ApiError::forbidden("You can only access your own tickets"));
    }
    Ok(ticket)
}

fn load_thread(repo: &SupportRepository, ticket_id: &Uuid) -> ApiResult<TicketThread> {
    repo.get_thread(ticket_id)?
        .ok_or_else(|| ApiError::not_found("Ticket"))
}

/// GET /support/tickets - The caller's tickets
pub async fn get_my_tickets(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<SupportTicket>>> {
    let tickets = SupportRepository::new(state.db.pool.clone()).list_for_user(&auth.id())?;
    Ok(Json(tickets))
}

/// POST /support/tickets - Open a ticket with its first message
pub async fn create_ticket(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateTicketRequest>,
) -> ApiResult<Json<TicketThread>> {
    let subject = validate_text("Subject", &payload.subject, SUBJECT_MAX_LEN)?;
    let message = validate_text("Message", &payload.message, MESSAGE_MAX_LEN)?;

    let repo = SupportRepository::new(state.db.pool.clone());
    let ticket_id = repo.create_ticket(&auth.id(), subject, message)?;
    tracing::info!("Support ticket {} opened by {}", ticket_id, auth.user.username);

    Ok(Json(load_thread(&repo, &ticket_id)?))
}

/// GET /support/tickets/:id - Ticket with its conversation
pub async fn get_ticket(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<TicketThread>> {
    let repo = SupportRepository::new(state.db.pool.clone());
    accessible_ticket(&repo, &ticket_id, &auth.user)?;
    Ok(Json(load_thread(&repo, &ticket_id)?))
}

/// POST /support/tickets/:id/messages - Reply as the owner or as staff
pub async fn reply_to_ticket(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(ticket_id): Path<Uuid>,
    Json(payload): Json<TicketReplyRequest>,
) -> ApiResult<Json<TicketThread>> {
    let content = validate_text("Message", &payload.content, MESSAGE_MAX_LEN)?;
    let repo = SupportRepository::new(state.db.pool.clone());
    let ticket = accessible_ticket(&repo, &ticket_id, &auth.user)?;
    if ticket.status == TicketStatus::Closed {
        return Err(ApiError::Conflict("Ticket is closed".to_string()));
    }

    let is_staff = auth.user.is_admin && ticket.user_id != auth.id();
    repo.add_message(&ticket_id, &auth.id(), content, is_staff)?;

    if is_staff {
        let note = format!("Support replied to \"{}\"", ticket.subject);
        notify(&state, &ticket.user_id, &auth.user, NotificationKind::Support, &note);
    }

    Ok(Json(load_thread(&repo, &ticket_id)?))
}

/// POST /support/tickets/:id/close
pub async fn close_ticket(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = SupportRepository::new(state.db.pool.clone());
    accessible_ticket(&repo, &ticket_id, &auth.user)?;
    repo.set_status(&ticket_id, TicketStatus::Closed)?;
    Ok(Json(ActionResponse::ok("Ticket closed")))
}
