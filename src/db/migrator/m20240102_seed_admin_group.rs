use crate::constants::permissions::{ADMIN, ADMINISTRATORS_GROUP, SUPERUSER};
use crate::entities::{groups, prelude::*};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let now = chrono::Utc::now().to_rfc3339();
        let permissions = serde_json::json!([ADMIN, SUPERUSER]).to_string();

        let insert = sea_orm_migration::sea_query::Query::insert()
            .into_table(Groups)
            .columns([
                groups::Column::Name,
                groups::Column::Permissions,
                groups::Column::CreatedAt,
                groups::Column::UpdatedAt,
            ])
            .values_panic([
                ADMINISTRATORS_GROUP.into(),
                permissions.into(),
                now.clone().into(),
                now.into(),
            ])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let delete = sea_orm_migration::sea_query::Query::delete()
            .from_table(Groups)
            .and_where(Expr::col(groups::Column::Name).eq(ADMINISTRATORS_GROUP))
            .to_owned();

        manager.exec_stmt(delete).await?;

        Ok(())
    }
}
