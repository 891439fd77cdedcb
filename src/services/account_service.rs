//! Domain service for the account lifecycle.
//!
//! Registration, activation and password recovery. Codes are generated here
//! and handed to the mailer; nothing in this module waits on delivery.

use thiserror::Error;

use crate::db::User;
use crate::domain::UserId;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Email address is already registered")]
    DuplicateEmail,

    #[error("User not found")]
    NotFound,

    #[error("Account is already activated")]
    AlreadyActivated,

    #[error("Activation code does not match")]
    CodeMismatch,

    #[error("Reset code is invalid or has expired")]
    CodeInvalidOrExpired,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AccountError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AccountError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Self-service registration input.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub password_confirmation: String,
}

#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    /// Creates an unactivated user and queues the welcome mail carrying the
    /// activation code.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::DuplicateEmail`], [`AccountError::Validation`]
    /// or [`AccountError::WeakPassword`].
    async fn register(&self, registration: Registration) -> Result<User, AccountError>;

    /// Exchanges an activation code. Succeeds once per user.
    ///
    /// A code is burnt after the configured number of wrong attempts; a new
    /// one has to be requested with [`AccountService::resend_activation`].
    async fn activate(&self, user_id: UserId, code: &str) -> Result<User, AccountError>;

    /// Issues a fresh activation code to an unactivated user.
    async fn resend_activation(&self, email: &str) -> Result<(), AccountError>;

    /// Issues a new reset code, invalidating any earlier one, queues the mail
    /// and returns the code.
    async fn request_password_reset(&self, email: &str) -> Result<String, AccountError>;

    /// Read-only check of a reset code.
    async fn check_reset_code(&self, user_id: UserId, code: &str) -> Result<(), AccountError>;

    /// Sets a new password if the code is valid and consumes the code.
    async fn confirm_password_reset(
        &self,
        user_id: UserId,
        code: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), AccountError>;
}
