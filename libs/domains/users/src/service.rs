use futures::future::BoxFuture;
use std::sync::Arc;

use crate::error::{UserError, UserResult};
use crate::models::{CreateUser, NewUser, UpdateUser, User, UserChanges, UserDetail, UserSummary};
use crate::password::hash_password;
use crate::policy::{Action, Actor, RoleBasedUserPolicy, Target, UserPolicy};
use crate::repository::{UserRepository, UserTransaction};

/// Service layer for the user resource: policy checks around repository
/// reads and transactional writes.
pub struct UserService<R: UserRepository> {
    repository: Arc<R>,
    policy: Arc<dyn UserPolicy>,
}

impl<R: UserRepository> UserService<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository: Arc::new(repository),
            policy: Arc::new(RoleBasedUserPolicy),
        }
    }

    /// Swap the default role-based policy.
    pub fn with_policy(mut self, policy: impl UserPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    fn authorize(&self, actor: &Actor, action: Action, target: Target<'_>) -> UserResult<()> {
        if self.policy.can_perform(actor, action, target) {
            Ok(())
        } else {
            tracing::info!(actor_id = actor.id, %action, target = ?target.user_id(), "Access denied");
            Err(UserError::Forbidden(action))
        }
    }

    /// Fetch first, then authorize against the record or the missing sentinel.
    /// A permitted check on a missing record yields `NotFound`.
    async fn load(&self, actor: &Actor, action: Action, id: i64) -> UserResult<User> {
        match self.repository.find(id).await? {
            Some(user) => {
                self.authorize(actor, action, Target::Instance(&user))?;
                Ok(user)
            }
            None => {
                self.authorize(actor, action, Target::Missing(id))?;
                Err(UserError::NotFound(id))
            }
        }
    }

    /// Run `op` inside a fresh transaction: commit on `Ok`, roll back on `Err`.
    async fn in_transaction<T, F>(&self, op: F) -> UserResult<T>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut R::Tx) -> BoxFuture<'t, UserResult<T>> + Send,
    {
        let mut tx = self.repository.begin().await?;

        match op(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    pub async fn list_users(&self, actor: &Actor) -> UserResult<Vec<UserSummary>> {
        self.authorize(actor, Action::Index, Target::Type)?;
        self.repository.list().await
    }

    pub async fn create_user(&self, actor: &Actor, input: CreateUser) -> UserResult<User> {
        self.authorize(actor, Action::Store, Target::Type)?;

        let CreateUser {
            name,
            email,
            password,
            roles,
        } = input;

        let result = async {
            let new_user = NewUser {
                name,
                email,
                password_hash: hash_password(&password)?,
            };

            self.in_transaction(move |tx| {
                Box::pin(async move {
                    let user = tx.insert_user(new_user).await?;
                    tx.sync_roles(user.id, &roles).await?;
                    Ok(user)
                })
            })
            .await
        }
        .await;

        let user = result.map_err(|e| UserError::StoreFailed(e.to_string()))?;
        tracing::info!(user_id = user.id, "Created user");
        Ok(user)
    }

    pub async fn get_user(&self, actor: &Actor, id: i64) -> UserResult<UserDetail> {
        match self.repository.find_with_roles(id).await? {
            Some((user, roles)) => {
                self.authorize(actor, Action::Show, Target::Instance(&user))?;
                Ok(UserDetail::new(user, roles))
            }
            None => {
                self.authorize(actor, Action::Show, Target::Missing(id))?;
                Err(UserError::NotFound(id))
            }
        }
    }

    pub async fn update_user(&self, actor: &Actor, id: i64, input: UpdateUser) -> UserResult<User> {
        let user = self.load(actor, Action::Update, id).await?;

        let UpdateUser {
            name,
            email,
            password,
            roles,
        } = input;

        if roles.is_some() {
            self.authorize(actor, Action::AssignRoles, Target::Instance(&user))?;
        }

        let result = async {
            let password_hash = match password {
                Some(p) if !p.trim().is_empty() => Some(hash_password(&p)?),
                _ => None,
            };
            let changes = UserChanges {
                name,
                email,
                password_hash,
            };

            self.in_transaction(move |tx| {
                Box::pin(async move {
                    let updated = tx.update_user(user.id, changes).await?;
                    if let Some(roles) = roles {
                        tx.sync_roles(updated.id, &roles).await?;
                    }
                    Ok(updated)
                })
            })
            .await
        }
        .await;

        let user = result.map_err(|e| UserError::UpdateFailed(e.to_string()))?;
        tracing::info!(user_id = user.id, "Updated user");
        Ok(user)
    }

    pub async fn delete_user(&self, actor: &Actor, id: i64) -> UserResult<()> {
        let user = self.load(actor, Action::Destroy, id).await?;

        self.in_transaction(move |tx| Box::pin(async move { tx.delete_user(user.id).await }))
            .await
            .map_err(|e| UserError::DeleteFailed(e.to_string()))?;

        tracing::info!(user_id = id, "Deleted user");
        Ok(())
    }
}
