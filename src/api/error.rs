use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::{AccessError, AccountError, AuthError, DirectoryError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    ExternalApiError { service: String, message: String },

    ValidationError(String),

    Conflict(String),

    InternalError(String),

    Unauthorized(String),

    Forbidden(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ApiError::ExternalApiError { service, message } => {
                write!(f, "{} error: {}", service, message)
            }
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            ApiError::ExternalApiError { service, message } => {
                tracing::warn!("{} error: {}", service, message);
                (
                    StatusCode::BAD_GATEWAY,
                    format!("{} is unavailable", service),
                )
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<tower_sessions::session::Error> for ApiError {
    fn from(err: tower_sessions::session::Error) -> Self {
        ApiError::InternalError(format!("Session error: {err}"))
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                ApiError::Unauthorized("Invalid email or password".to_string())
            }
            AuthError::NotActivated => {
                ApiError::Forbidden("Your account has not been activated yet".to_string())
            }
            AuthError::Suspended { until } => ApiError::Forbidden(format!(
                "Your account is suspended until {}",
                until.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            AuthError::Banned => ApiError::Forbidden("Your account has been banned".to_string()),
            AuthError::ProviderError(message) => ApiError::ExternalApiError {
                service: "Social sign-in".to_string(),
                message,
            },
            AuthError::UserDenied => {
                ApiError::Unauthorized("Social sign-in was cancelled".to_string())
            }
            AuthError::WeakPassword(msg) | AuthError::Validation(msg) => {
                ApiError::ValidationError(msg)
            }
            AuthError::Database(msg) => ApiError::DatabaseError(msg),
            AuthError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(msg) | AccountError::WeakPassword(msg) => {
                ApiError::ValidationError(msg)
            }
            AccountError::DuplicateEmail => ApiError::Conflict(
                "An account with that email address already exists".to_string(),
            ),
            AccountError::NotFound => ApiError::NotFound("User was not found".to_string()),
            AccountError::AlreadyActivated => {
                ApiError::Conflict("This account is already activated".to_string())
            }
            AccountError::CodeMismatch => {
                ApiError::ValidationError("The activation code is invalid".to_string())
            }
            AccountError::CodeInvalidOrExpired => ApiError::ValidationError(
                "The password reset code is invalid or has expired".to_string(),
            ),
            AccountError::Database(msg) => ApiError::DatabaseError(msg),
            AccountError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Validation(msg) | DirectoryError::WeakPassword(msg) => {
                ApiError::ValidationError(msg)
            }
            e @ DirectoryError::NotFound(_) => ApiError::NotFound(e.to_string()),
            e @ (DirectoryError::DuplicateEmail | DirectoryError::DuplicateName(_)) => {
                ApiError::Conflict(e.to_string())
            }
            e @ (DirectoryError::SelfDeletionForbidden | DirectoryError::SelfLockoutForbidden) => {
                ApiError::Forbidden(e.to_string())
            }
            DirectoryError::Database(msg) => ApiError::DatabaseError(msg),
            DirectoryError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Database(msg) => ApiError::DatabaseError(msg),
            AccessError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        ApiError::NotFound(format!("{} {} not found", resource, id))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::InternalError(msg.into())
    }

    /// Message safe to show the user, or `None` for faults that must stay a
    /// generic 500.
    #[must_use]
    pub fn user_message(&self) -> Option<String> {
        match self {
            ApiError::NotFound(msg)
            | ApiError::ValidationError(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg) => Some(msg.clone()),
            ApiError::ExternalApiError { service, .. } => Some(format!("{service} failed")),
            ApiError::DatabaseError(_) | ApiError::InternalError(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_have_no_user_message() {
        let err = ApiError::from(AccountError::Database("disk I/O error".to_string()));
        assert!(err.user_message().is_none());

        let err = ApiError::from(AuthError::Internal("boom".to_string()));
        assert!(err.user_message().is_none());
    }

    #[test]
    fn expected_outcomes_map_to_messages() {
        let err = ApiError::from(AuthError::InvalidCredentials);
        assert_eq!(err.user_message().as_deref(), Some("Invalid email or password"));

        let err = ApiError::from(DirectoryError::SelfDeletionForbidden);
        assert!(matches!(err, ApiError::Forbidden(_)));

        let err = ApiError::from(DirectoryError::NotFound("User 4".to_string()));
        assert_eq!(err.user_message().as_deref(), Some("User 4 not found"));
    }

    #[test]
    fn status_codes() {
        let response = ApiError::from(AccountError::DuplicateEmail).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = ApiError::internal("secret detail").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
