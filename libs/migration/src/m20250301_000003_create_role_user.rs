use sea_orm_migration::prelude::*;

use crate::m20250301_000001_create_users::Users;
use crate::m20250301_000002_create_roles::Roles;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RoleUser::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RoleUser::UserId).big_integer().not_null())
                    .col(ColumnDef::new(RoleUser::RoleId).big_integer().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_role_user")
                            .col(RoleUser::UserId)
                            .col(RoleUser::RoleId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_role_user_user_id")
                            .from(RoleUser::Table, RoleUser::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_role_user_role_id")
                            .from(RoleUser::Table, RoleUser::RoleId)
                            .to(Roles::Table, Roles::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The primary key already covers lookups by user_id.
        manager
            .create_index(
                Index::create()
                    .name("idx_role_user_role_id")
                    .table(RoleUser::Table)
                    .col(RoleUser::RoleId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RoleUser::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RoleUser {
    Table,
    UserId,
    RoleId,
}
