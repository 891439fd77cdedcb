use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveValue::{Set, Unchanged},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
    sea_query::OnConflict,
};
use std::collections::BTreeSet;

use crate::domain::GroupId;
use crate::domain::permissions::{PermissionSet, decode_group_permissions, encode_group_permissions};
use crate::entities::{groups, prelude::*, user_groups};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub permissions: PermissionSet,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<groups::Model> for Group {
    type Error = anyhow::Error;

    fn try_from(model: groups::Model) -> Result<Self> {
        let permissions = decode_group_permissions(&model.permissions)
            .with_context(|| format!("Corrupt permissions on group {}", model.id))?;

        Ok(Self {
            id: GroupId::new(model.id),
            name: model.name,
            permissions,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Result of replacing a user's memberships.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MembershipDiff {
    pub added: Vec<i32>,
    pub removed: Vec<i32>,
}

pub struct GroupRepository {
    conn: DatabaseConnection,
}

impl GroupRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, name: &str, permissions: &PermissionSet) -> Result<Group> {
        let now = Utc::now().to_rfc3339();

        let inserted = Groups::insert(groups::ActiveModel {
            name: Set(name.to_string()),
            permissions: Set(encode_group_permissions(permissions)),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        })
        .exec(&self.conn)
        .await?;

        let model = Groups::find_by_id(inserted.last_insert_id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created group"))?;

        Group::try_from(model)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<Group>> {
        Groups::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query group")?
            .map(Group::try_from)
            .transpose()
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Group>> {
        Groups::find()
            .filter(groups::Column::Name.eq(name))
            .one(&self.conn)
            .await
            .context("Failed to query group by name")?
            .map(Group::try_from)
            .transpose()
    }

    pub async fn list(&self) -> Result<Vec<Group>> {
        Groups::find()
            .order_by_asc(groups::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to list groups")?
            .into_iter()
            .map(Group::try_from)
            .collect()
    }

    /// Returns `None` if the group does not exist.
    pub async fn update(
        &self,
        id: i32,
        name: &str,
        permissions: &PermissionSet,
    ) -> Result<Option<Group>> {
        if Groups::find_by_id(id).one(&self.conn).await?.is_none() {
            return Ok(None);
        }

        let model = Groups::update(groups::ActiveModel {
            id: Unchanged(id),
            name: Set(name.to_string()),
            permissions: Set(encode_group_permissions(permissions)),
            updated_at: Set(Utc::now().to_rfc3339()),
            ..Default::default()
        })
        .exec(&self.conn)
        .await?;

        Group::try_from(model).map(Some)
    }

    /// Deletes a group and detaches every member.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let txn = self.conn.begin().await?;

        UserGroups::delete_many()
            .filter(user_groups::Column::GroupId.eq(id))
            .exec(&txn)
            .await?;
        let result = Groups::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    /// Idempotent. Returns `true` if the membership was newly created.
    pub async fn add_member(&self, user_id: i32, group_id: i32) -> Result<bool> {
        let inserted = UserGroups::insert(user_groups::ActiveModel {
            user_id: Set(user_id),
            group_id: Set(group_id),
        })
        .on_conflict(
            OnConflict::columns([user_groups::Column::UserId, user_groups::Column::GroupId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.conn)
        .await
        .context("Failed to add group member")?;

        Ok(inserted > 0)
    }

    /// Idempotent. Returns `true` if a membership was removed.
    pub async fn remove_member(&self, user_id: i32, group_id: i32) -> Result<bool> {
        let result = UserGroups::delete_many()
            .filter(user_groups::Column::UserId.eq(user_id))
            .filter(user_groups::Column::GroupId.eq(group_id))
            .exec(&self.conn)
            .await
            .context("Failed to remove group member")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn groups_for_user(&self, user_id: i32) -> Result<Vec<Group>> {
        let rows = UserGroups::find()
            .filter(user_groups::Column::UserId.eq(user_id))
            .find_also_related(Groups)
            .all(&self.conn)
            .await
            .context("Failed to load user groups")?;

        rows.into_iter()
            .filter_map(|(_, group)| group)
            .map(Group::try_from)
            .collect()
    }

    pub async fn member_ids(&self, group_id: i32) -> Result<Vec<i32>> {
        let rows = UserGroups::find()
            .filter(user_groups::Column::GroupId.eq(group_id))
            .order_by_asc(user_groups::Column::UserId)
            .all(&self.conn)
            .await
            .context("Failed to load group members")?;

        Ok(rows.into_iter().map(|r| r.user_id).collect())
    }

    /// Replaces a user's memberships with `desired`, touching only the rows
    /// that differ.
    pub async fn set_user_groups(&self, user_id: i32, desired: &[i32]) -> Result<MembershipDiff> {
        let txn = self.conn.begin().await?;

        let current: BTreeSet<i32> = UserGroups::find()
            .filter(user_groups::Column::UserId.eq(user_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|r| r.group_id)
            .collect();
        let desired: BTreeSet<i32> = desired.iter().copied().collect();

        let diff = MembershipDiff {
            added: desired.difference(&current).copied().collect(),
            removed: current.difference(&desired).copied().collect(),
        };

        if !diff.removed.is_empty() {
            UserGroups::delete_many()
                .filter(user_groups::Column::UserId.eq(user_id))
                .filter(user_groups::Column::GroupId.is_in(diff.removed.clone()))
                .exec(&txn)
                .await?;
        }

        if !diff.added.is_empty() {
            let rows = diff.added.iter().map(|group_id| user_groups::ActiveModel {
                user_id: Set(user_id),
                group_id: Set(*group_id),
            });
            UserGroups::insert_many(rows)
                .on_conflict(
                    OnConflict::columns([
                        user_groups::Column::UserId,
                        user_groups::Column::GroupId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(diff)
    }
}
