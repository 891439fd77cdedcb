use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use super::user::generate_code;
use crate::domain::clock;
use crate::entities::{prelude::*, sessions};

pub struct SessionRepository {
    conn: DatabaseConnection,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        user_id: i32,
        remember: bool,
        lifetime: Duration,
    ) -> Result<sessions::Model> {
        let now = Utc::now();
        let model = sessions::Model {
            token: generate_code(),
            user_id,
            remember,
            created_at: now,
            expires_at: clock::deadline(now, lifetime),
        };

        Sessions::insert(sessions::ActiveModel {
            token: Set(model.token.clone()),
            user_id: Set(model.user_id),
            remember: Set(model.remember),
            created_at: Set(model.created_at),
            expires_at: Set(model.expires_at),
        })
        .exec_without_returning(&self.conn)
        .await
        .context("Failed to create session")?;

        Ok(model)
    }

    /// Returns the session only if it has not expired.
    pub async fn find_live(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<sessions::Model>> {
        let session = Sessions::find_by_id(token.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query session")?;

        Ok(session.filter(|s| s.expires_at > now))
    }

    /// Idempotent.
    pub async fn delete(&self, token: &str) -> Result<bool> {
        let result = Sessions::delete_by_id(token.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to delete session")?;
        Ok(result.rows_affected > 0)
    }

    pub async fn delete_for_user(&self, user_id: i32) -> Result<u64> {
        let result = Sessions::delete_many()
            .filter(sessions::Column::UserId.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete user sessions")?;
        Ok(result.rows_affected)
    }

    /// Deletes every expired session regardless of owner.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = Sessions::delete_many()
            .filter(sessions::Column::ExpiresAt.lte(now))
            .exec(&self.conn)
            .await
            .context("Failed to purge expired sessions")?;
        Ok(result.rows_affected)
    }

    pub async fn purge_expired_for_user(&self, user_id: i32, now: DateTime<Utc>) -> Result<u64> {
        let result = Sessions::delete_many()
            .filter(sessions::Column::UserId.eq(user_id))
            .filter(sessions::Column::ExpiresAt.lte(now))
            .exec(&self.conn)
            .await
            .context("Failed to purge expired sessions")?;
        Ok(result.rows_affected)
    }

    pub async fn count_for_user(&self, user_id: i32) -> Result<u64> {
        use sea_orm::PaginatorTrait;

        Sessions::find()
            .filter(sessions::Column::UserId.eq(user_id))
            .count(&self.conn)
            .await
            .context("Failed to count sessions")
    }
}
