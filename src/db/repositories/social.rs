use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::{prelude::*, social_identities};

pub struct SocialIdentityRepository {
    conn: DatabaseConnection,
}

impl SocialIdentityRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn find_user_id(&self, provider: &str, provider_user_id: &str) -> Result<Option<i32>> {
        let row = SocialIdentities::find()
            .filter(social_identities::Column::Provider.eq(provider))
            .filter(social_identities::Column::ProviderUserId.eq(provider_user_id))
            .one(&self.conn)
            .await
            .context("Failed to query social identity")?;

        Ok(row.map(|r| r.user_id))
    }

    /// Links a provider identity to a user. A concurrent link of the same
    /// identity surfaces as a unique violation.
    pub async fn link(&self, provider: &str, provider_user_id: &str, user_id: i32) -> Result<()> {
        SocialIdentities::insert(social_identities::ActiveModel {
            provider: Set(provider.to_string()),
            provider_user_id: Set(provider_user_id.to_string()),
            user_id: Set(user_id),
            created_at: Set(Utc::now().to_rfc3339()),
            ..Default::default()
        })
        .exec(&self.conn)
        .await?;

        Ok(())
    }
}
