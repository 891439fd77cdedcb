//! Domain service for administering users and groups.

use thiserror::Error;

use crate::db::{Group, User};
use crate::domain::permissions::{PermissionMap, PermissionSet};
use crate::domain::{GroupId, UserId};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Email address is already registered")]
    DuplicateEmail,

    #[error("A group named {0:?} already exists")]
    DuplicateName(String),

    #[error("You cannot delete your own account")]
    SelfDeletionForbidden,

    #[error("You cannot suspend or ban your own account")]
    SelfLockoutForbidden,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for DirectoryError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for DirectoryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl DirectoryError {
    pub(crate) fn user_not_found(id: UserId) -> Self {
        Self::NotFound(format!("User {id}"))
    }

    pub(crate) fn group_not_found(id: GroupId) -> Self {
        Self::NotFound(format!("Group {id}"))
    }
}

/// Admin input for creating or editing a user.
#[derive(Debug, Clone, Default)]
pub struct UserForm {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Required on create; on edit an empty password keeps the current one.
    pub password: String,
    pub password_confirmation: String,
    pub activated: bool,
    pub groups: Vec<GroupId>,
    pub permissions: PermissionMap,
}

#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

#[derive(Debug, Clone)]
pub struct UserDetail {
    pub user: User,
    pub groups: Vec<Group>,
    pub effective_permissions: PermissionMap,
}

#[derive(Debug, Clone)]
pub struct GroupDetail {
    pub group: Group,
    pub members: Vec<User>,
}

#[async_trait::async_trait]
pub trait DirectoryService: Send + Sync {
    /// One page of users. Pages start at 1.
    async fn list_users(&self, page: u64) -> Result<UserPage, DirectoryError>;

    async fn get_user(&self, id: UserId) -> Result<UserDetail, DirectoryError>;

    async fn create_user(&self, actor: UserId, form: UserForm) -> Result<User, DirectoryError>;

    /// Updates profile, password, activation, memberships and overrides.
    ///
    /// Memberships are reconciled by diff; activation can be granted but not
    /// revoked.
    async fn update_user(
        &self,
        actor: UserId,
        id: UserId,
        form: UserForm,
    ) -> Result<User, DirectoryError>;

    /// # Errors
    ///
    /// Returns [`DirectoryError::SelfDeletionForbidden`] if `actor == id`.
    async fn delete_user(&self, actor: UserId, id: UserId) -> Result<(), DirectoryError>;

    async fn suspend_user(&self, actor: UserId, id: UserId) -> Result<User, DirectoryError>;

    async fn unsuspend_user(&self, id: UserId) -> Result<User, DirectoryError>;

    /// Bans permanently and ends every session of the user.
    async fn ban_user(&self, actor: UserId, id: UserId) -> Result<User, DirectoryError>;

    async fn list_groups(&self) -> Result<Vec<Group>, DirectoryError>;

    async fn get_group(&self, id: GroupId) -> Result<GroupDetail, DirectoryError>;

    async fn create_group(
        &self,
        name: &str,
        permissions: PermissionSet,
    ) -> Result<Group, DirectoryError>;

    async fn update_group(
        &self,
        id: GroupId,
        name: &str,
        permissions: PermissionSet,
    ) -> Result<Group, DirectoryError>;

    /// Deletes the group and detaches all of its members.
    async fn delete_group(&self, id: GroupId) -> Result<(), DirectoryError>;

    /// Idempotent.
    async fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<(), DirectoryError>;

    /// Idempotent.
    async fn remove_member(&self, group_id: GroupId, user_id: UserId)
    -> Result<(), DirectoryError>;
}
