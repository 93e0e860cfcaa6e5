use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use circle_types::ErrorResponse;

use crate::validation::ValidationError;

pub type ApiResult<T> = Result<T, ApiError>;

pub const AUTH_REQUIRED: &str = "Authentication required";

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    TooManyRequests(String),
    InternalError(String),
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        ApiError::Unauthorized(AUTH_REQUIRED.to_string())
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    pub fn forbidden(msg: &str) -> Self {
        ApiError::Forbidden(msg.to_string())
    }

    /// 409 with `msg` when a write lost a race on a UNIQUE column, otherwise
    /// the usual internal error
    pub fn conflict_on_constraint(err: anyhow::Error, msg: &str) -> Self {
        if is_constraint_violation(&err) {
            ApiError::Conflict(msg.to_string())
        } else {
            err.into()
        }
    }
}

fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            success: false,
            message,
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(format!("{:#}", err))
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let response = ApiError::Conflict("Username already taken".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Username already taken");
    }

    #[tokio::test]
    async fn test_internal_error_details_are_hidden() {
        let err: ApiError = anyhow::anyhow!("disk I/O error at /var/db").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["message"], "An unexpected error occurred");
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        use crate::db::repositories::UserRepository;
        use crate::db::testing::{create_user, test_db};

        let db = test_db();
        create_user(&db, "alice");
        let err = UserRepository::new(db.pool.clone())
            .create("Alice", "hash", "another-key", None)
            .unwrap_err();

        let mapped = ApiError::conflict_on_constraint(err, "Username already taken");
        assert!(matches!(mapped, ApiError::Conflict(ref msg) if msg == "Username already taken"));

        let other = ApiError::conflict_on_constraint(anyhow::anyhow!("pool timed out"), "taken");
        assert!(matches!(other, ApiError::InternalError(_)));
    }

    #[test]
    fn test_validation_error_is_bad_request() {
        let err: ApiError = ValidationError::Empty("Post").into();
        assert!(matches!(err, ApiError::BadRequest(ref msg) if msg == "Post cannot be empty"));
    }
}
