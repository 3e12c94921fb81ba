//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use helpdesk_shared::SupportError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Unprocessable request: {0}")]
    Unprocessable(String),

    // Resource errors
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),

    // Internal errors
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE_ENTITY", msg.clone()),

            // Resources
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Internal
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", "Storage error".to_string()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
            ApiError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<SupportError> for ApiError {
    fn from(err: SupportError) -> Self {
        match err {
            SupportError::Validation(msg) => ApiError::Validation(msg),
            SupportError::Forbidden(msg) => ApiError::Forbidden(msg),
            SupportError::NotFound(msg) => ApiError::NotFound(msg),
            e @ (SupportError::ForbiddenKind(_) | SupportError::ReservedKind) => {
                ApiError::Unprocessable(e.to_string())
            }
            e @ SupportError::InvalidTransition { .. } => ApiError::Conflict(e.to_string()),
            SupportError::Persistence(msg) => {
                tracing::error!(error = %msg, "Support store failure");
                ApiError::Storage(msg)
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_shared::{ConversationStatus, MessageKind};

    #[test]
    fn test_support_error_status_codes() {
        let cases = [
            (SupportError::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (SupportError::Forbidden("nope".into()), StatusCode::FORBIDDEN),
            (SupportError::NotFound("conversation".into()), StatusCode::NOT_FOUND),
            (SupportError::ForbiddenKind(MessageKind::User), StatusCode::UNPROCESSABLE_ENTITY),
            (SupportError::ReservedKind, StatusCode::UNPROCESSABLE_ENTITY),
            (
                SupportError::InvalidTransition {
                    from: ConversationStatus::Closed,
                    to: ConversationStatus::Pending,
                },
                StatusCode::CONFLICT,
            ),
            (SupportError::Persistence("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
