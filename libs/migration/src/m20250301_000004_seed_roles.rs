use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Insertion order fixes ids on a fresh database: admin = 1, user = 2.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                INSERT INTO roles (name)
                VALUES ('admin'), ('user')
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DELETE FROM roles WHERE name IN ('admin', 'user')")
            .await?;

        Ok(())
    }
}
