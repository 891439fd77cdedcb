//! Access controller: resolves effective permissions for an explicit user.

use thiserror::Error;

use crate::db::{Store, User};
use crate::domain::permissions::{self, PermissionMap};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AccessError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AccessError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Clone)]
pub struct AccessController {
    store: Store,
}

impl AccessController {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Group grants first, then the user's own overrides.
    pub async fn effective_permissions(&self, user: &User) -> Result<PermissionMap, AccessError> {
        let groups = self
            .store
            .group_repo()
            .groups_for_user(user.id.value())
            .await?;

        Ok(permissions::effective_permissions(
            groups.iter().map(|g| &g.permissions),
            &user.permissions,
        ))
    }

    pub async fn authorize(&self, user: &User, key: &str) -> Result<bool, AccessError> {
        let effective = self.effective_permissions(user).await?;
        Ok(permissions::authorize(&effective, key))
    }
}
