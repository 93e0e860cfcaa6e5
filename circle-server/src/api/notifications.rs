use axum::{
    extract::{Path, Query, State},
    Json,
};
use circle_types::{ActionResponse, CountResponse, Notification};
use uuid::Uuid;

use super::{ApiError, ApiResult, Pagination};
use crate::auth::AuthUser;
use crate::db::repositories::NotificationRepository;
use crate::state::AppState;

/// GET /notifications - Newest first
pub async fn get_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = NotificationRepository::new(state.db.pool.clone()).list(
        &auth.id(),
        page.limit(),
        page.offset(),
    )?;
    Ok(Json(notifications))
}

/// GET /notifications/unread-count
pub async fn get_unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<CountResponse>> {
    let count = NotificationRepository::new(state.db.pool.clone()).unread_count(&auth.id())?;
    Ok(Json(CountResponse {
        success: true,
        count,
    }))
}

/// POST /notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    if !NotificationRepository::new(state.db.pool.clone()).mark_read(&notification_id, &auth.id())? {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(Json(ActionResponse::ok("Notification marked as read")))
}

/// POST /notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<CountResponse>> {
    let count = NotificationRepository::new(state.db.pool.clone()).mark_all_read(&auth.id())?;
    Ok(Json(CountResponse {
        success: true,
        count: count as i64,
    }))
}

/// DELETE /notifications/:id
pub async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    if !NotificationRepository::new(state.db.pool.clone()).delete(&notification_id, &auth.id())? {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(Json(ActionResponse::ok("Notification deleted")))
}
