use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, ModelTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr, TransactionTrait,
};
use std::collections::BTreeSet;

use crate::{
    entity::{role, role_user, user},
    error::{UserError, UserResult},
    models::{NewUser, Role, User, UserChanges, UserSummary},
    repository::{UserRepository, UserTransaction},
};

#[derive(Clone)]
pub struct PgUserRepository {
    db: DatabaseConnection,
}

impl PgUserRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Unique violations on `users.email` become a domain error; everything else
/// stays a database error.
fn email_conflict(err: DbErr, email: &str) -> UserError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => UserError::DuplicateEmail(email.to_string()),
        _ => UserError::Database(err),
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    type Tx = PgUserTransaction;

    async fn list(&self) -> UserResult<Vec<UserSummary>> {
        let rows = user::Entity::find()
            .select_only()
            .columns([
                user::Column::Id,
                user::Column::Name,
                user::Column::Email,
                user::Column::CreatedAt,
                user::Column::UpdatedAt,
            ])
            .order_by_asc(user::Column::Id)
            .into_tuple::<(i64, String, String, DateTimeWithTimeZone, DateTimeWithTimeZone)>()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, email, created_at, updated_at)| UserSummary {
                id,
                name,
                email,
                created_at: created_at.into(),
                updated_at: updated_at.into(),
            })
            .collect())
    }

    async fn find(&self, id: i64) -> UserResult<Option<User>> {
        let model = user::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn find_with_roles(&self, id: i64) -> UserResult<Option<(User, Vec<Role>)>> {
        let Some(model) = user::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let roles = model
            .find_related(role::Entity)
            .order_by_asc(role::Column::Id)
            .all(&self.db)
            .await?;

        Ok(Some((
            model.into(),
            roles.into_iter().map(Into::into).collect(),
        )))
    }

    async fn begin(&self) -> UserResult<Self::Tx> {
        let txn = self.db.begin().await?;
        Ok(PgUserTransaction { txn })
    }
}

/// Wraps a SeaORM transaction; SeaORM rolls it back if it is dropped
/// without a commit.
pub struct PgUserTransaction {
    txn: DatabaseTransaction,
}

#[async_trait]
impl UserTransaction for PgUserTransaction {
    async fn insert_user(&mut self, input: NewUser) -> UserResult<User> {
        let now = Utc::now();
        let active = user::ActiveModel {
            id: NotSet,
            name: Set(input.name),
            email: Set(input.email.clone()),
            password: Set(input.password_hash),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let model = active
            .insert(&self.txn)
            .await
            .map_err(|e| email_conflict(e, &input.email))?;

        tracing::debug!(user_id = model.id, "Inserted user");
        Ok(model.into())
    }

    async fn update_user(&mut self, id: i64, changes: UserChanges) -> UserResult<User> {
        let model = user::Entity::find_by_id(id)
            .one(&self.txn)
            .await?
            .ok_or(UserError::NotFound(id))?;

        if changes.is_empty() {
            return Ok(model.into());
        }

        let email = changes.email.clone();
        let mut active = model.into_active_model();
        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(email) = changes.email {
            active.email = Set(email);
        }
        if let Some(hash) = changes.password_hash {
            active.password = Set(hash);
        }
        active.updated_at = Set(Utc::now().into());

        let model = active.update(&self.txn).await.map_err(|e| match email.as_deref() {
            Some(email) => email_conflict(e, email),
            None => UserError::Database(e),
        })?;

        tracing::debug!(user_id = id, "Updated user");
        Ok(model.into())
    }

    async fn delete_user(&mut self, id: i64) -> UserResult<()> {
        // role_user rows follow through ON DELETE CASCADE
        let result = user::Entity::delete_by_id(id).exec(&self.txn).await?;
        if result.rows_affected == 0 {
            return Err(UserError::NotFound(id));
        }

        tracing::debug!(user_id = id, "Deleted user");
        Ok(())
    }

    async fn sync_roles(&mut self, user_id: i64, role_ids: &[i64]) -> UserResult<()> {
        let wanted: BTreeSet<i64> = role_ids.iter().copied().collect();

        let existing: BTreeSet<i64> = if wanted.is_empty() {
            BTreeSet::new()
        } else {
            role::Entity::find()
                .select_only()
                .column(role::Column::Id)
                .filter(role::Column::Id.is_in(wanted.iter().copied()))
                .into_tuple::<i64>()
                .all(&self.txn)
                .await?
                .into_iter()
                .collect()
        };

        let missing: Vec<i64> = wanted.difference(&existing).copied().collect();
        if !missing.is_empty() {
            return Err(UserError::InvalidRoles(missing));
        }

        role_user::Entity::delete_many()
            .filter(role_user::Column::UserId.eq(user_id))
            .exec(&self.txn)
            .await?;

        if !wanted.is_empty() {
            let rows = wanted.iter().map(|&role_id| role_user::ActiveModel {
                user_id: Set(user_id),
                role_id: Set(role_id),
            });
            role_user::Entity::insert_many(rows)
                .exec_without_returning(&self.txn)
                .await?;
        }

        tracing::debug!(user_id, roles = ?wanted, "Synced user roles");
        Ok(())
    }

    async fn commit(self) -> UserResult<()> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> UserResult<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn user_model(id: i64) -> user::Model {
        let now = Utc::now().fixed_offset();
        user::Model {
            id,
            name: "A".into(),
            email: "a@x.com".into(),
            password: "$argon2id$hash".into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn role_ids(ids: &[i64]) -> Vec<BTreeMap<&'static str, Value>> {
        ids.iter()
            .map(|&id| BTreeMap::from([("id", Value::BigInt(Some(id)))]))
            .collect()
    }

    #[tokio::test]
    async fn test_find_maps_password_column() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user_model(1)]])
            .into_connection();
        let repo = PgUserRepository::new(db);

        let user = repo.find(1).await.unwrap().unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.password_hash, "$argon2id$hash");
    }

    #[tokio::test]
    async fn test_find_with_roles_missing_user() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .into_connection();
        let repo = PgUserRepository::new(db);

        assert!(repo.find_with_roles(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_user_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let repo = PgUserRepository::new(db);

        let mut tx = repo.begin().await.unwrap();
        let err = tx.delete_user(9).await.unwrap_err();
        assert!(matches!(err, UserError::NotFound(9)));
    }

    #[tokio::test]
    async fn test_sync_roles_rejects_unknown_ids_before_writing() {
        // No exec results: any delete or insert would surface as a database error
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([role_ids(&[1, 2])])
            .into_connection();
        let repo = PgUserRepository::new(db);

        let mut tx = repo.begin().await.unwrap();
        let err = tx.sync_roles(7, &[2, 999, 1]).await.unwrap_err();
        assert!(matches!(err, UserError::InvalidRoles(ref ids) if ids == &vec![999]));
    }

    #[tokio::test]
    async fn test_sync_roles_replaces_assignments() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([role_ids(&[1, 2])])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
            ])
            .into_connection();
        let repo = PgUserRepository::new(db);

        let mut tx = repo.begin().await.unwrap();
        tx.sync_roles(7, &[2, 1]).await.unwrap();
    }
}
