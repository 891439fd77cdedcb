//! Domain service for authentication.
//!
//! Handles credential checks, login sessions, throttling, social sign-in and
//! password changes. Every operation takes the session token or user id it
//! acts on explicitly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::User;
use crate::domain::UserId;
use crate::entities::sessions;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is not activated")]
    NotActivated,

    #[error("Account is suspended until {until}")]
    Suspended { until: DateTime<Utc> },

    #[error("Account is banned")]
    Banned,

    #[error("Social provider error: {0}")]
    ProviderError(String),

    #[error("Social sign-in was cancelled")]
    UserDenied,

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// One authenticated login.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub remember: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<sessions::Model> for Session {
    fn from(model: sessions::Model) -> Self {
        Self {
            token: model.token,
            user_id: UserId::new(model.user_id),
            remember: model.remember,
            created_at: model.created_at,
            expires_at: model.expires_at,
        }
    }
}

/// Normalized profile returned by a social provider adapter.
#[derive(Debug, Clone)]
pub struct SocialProfile {
    pub provider: String,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Failure reported by a social provider adapter.
#[derive(Debug, Clone, Error)]
pub enum SocialFailure {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("user denied access")]
    UserDenied,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials and opens a session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for an unknown email or a
    /// wrong password, [`AuthError::NotActivated`], [`AuthError::Suspended`]
    /// or [`AuthError::Banned`] for accounts that may not log in.
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<Session, AuthError>;

    /// Destroys a session. Unknown tokens are ignored.
    async fn logout(&self, token: &str) -> Result<(), AuthError>;

    /// Returns the user behind a live session. Read-only.
    async fn check(&self, token: &str) -> Result<Option<User>, AuthError>;

    /// Maps a provider result to a local user and opens a session.
    async fn login_with_social(
        &self,
        result: Result<SocialProfile, SocialFailure>,
        remember: bool,
    ) -> Result<Session, AuthError>;

    /// Changes the password of a logged-in user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if the current password is
    /// wrong, [`AuthError::Validation`] or [`AuthError::WeakPassword`] if the
    /// new password is rejected.
    async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), AuthError>;
}
