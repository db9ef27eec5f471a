use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::error::{UserError, UserResult};
use crate::models::{NewUser, Role, User, UserChanges, UserSummary};

/// Read side of user persistence plus the entry point for writes.
///
/// Reads run outside any transaction. Every write goes through a
/// [`UserTransaction`] obtained from [`UserRepository::begin`].
#[async_trait]
pub trait UserRepository: Send + Sync {
    type Tx: UserTransaction;

    /// All users in id order, projected without password or roles
    async fn list(&self) -> UserResult<Vec<UserSummary>>;

    async fn find(&self, id: i64) -> UserResult<Option<User>>;

    /// A user together with its roles (ordered by role id)
    async fn find_with_roles(&self, id: i64) -> UserResult<Option<(User, Vec<Role>)>>;

    async fn begin(&self) -> UserResult<Self::Tx>;
}

/// A write scope. Changes become visible only after [`commit`](Self::commit);
/// dropping the handle without committing discards them.
#[async_trait]
pub trait UserTransaction: Send {
    async fn insert_user(&mut self, user: NewUser) -> UserResult<User>;

    async fn update_user(&mut self, id: i64, changes: UserChanges) -> UserResult<User>;

    async fn delete_user(&mut self, id: i64) -> UserResult<()>;

    /// Replace the user's role set. Fails with [`UserError::InvalidRoles`]
    /// listing every id that does not exist.
    async fn sync_roles(&mut self, user_id: i64, role_ids: &[i64]) -> UserResult<()>;

    async fn commit(self) -> UserResult<()>;

    async fn rollback(self) -> UserResult<()>;
}

#[derive(Debug, Clone, Default)]
struct State {
    users: BTreeMap<i64, User>,
    roles: BTreeMap<i64, Role>,
    /// (user_id, role_id)
    role_user: BTreeSet<(i64, i64)>,
    next_user_id: i64,
    next_role_id: i64,
}

impl State {
    fn roles_of(&self, user_id: i64) -> Vec<Role> {
        self.role_user
            .range((user_id, i64::MIN)..=(user_id, i64::MAX))
            .filter_map(|(_, role_id)| self.roles.get(role_id).cloned())
            .collect()
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email == email)
    }
}

/// In-memory implementation of UserRepository (for development/testing).
///
/// Seeded with the `admin` (id 1) and `user` (id 2) roles, like a freshly
/// migrated database. A transaction holds the write lock for its whole
/// lifetime and works on a staged copy of the state.
#[derive(Debug, Clone)]
pub struct InMemoryUserRepository {
    state: Arc<RwLock<State>>,
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        let mut state = State {
            next_user_id: 1,
            next_role_id: 1,
            ..Default::default()
        };
        for name in ["admin", "user"] {
            let id = state.next_role_id;
            state.next_role_id += 1;
            state.roles.insert(id, Role { id, name: name.to_string() });
        }

        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Adds a role outside any transaction and returns it.
    pub async fn add_role(&self, name: &str) -> Role {
        let mut state = self.state.write().await;
        let id = state.next_role_id;
        state.next_role_id += 1;
        let role = Role { id, name: name.to_string() };
        state.roles.insert(id, role.clone());
        role
    }

    /// Number of stored role assignments, for asserting rollbacks.
    pub async fn assignment_count(&self) -> usize {
        self.state.read().await.role_user.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    type Tx = InMemoryUserTransaction;

    async fn list(&self) -> UserResult<Vec<UserSummary>> {
        let state = self.state.read().await;
        Ok(state.users.values().cloned().map(UserSummary::from).collect())
    }

    async fn find(&self, id: i64) -> UserResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn find_with_roles(&self, id: i64) -> UserResult<Option<(User, Vec<Role>)>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(&id)
            .cloned()
            .map(|user| (user, state.roles_of(id))))
    }

    async fn begin(&self) -> UserResult<Self::Tx> {
        let guard = self.state.clone().write_owned().await;
        let staged = (*guard).clone();
        Ok(InMemoryUserTransaction { guard, staged })
    }
}

pub struct InMemoryUserTransaction {
    guard: OwnedRwLockWriteGuard<State>,
    staged: State,
}

#[async_trait]
impl UserTransaction for InMemoryUserTransaction {
    async fn insert_user(&mut self, user: NewUser) -> UserResult<User> {
        if self.staged.email_taken(&user.email, None) {
            return Err(UserError::DuplicateEmail(user.email));
        }

        let id = self.staged.next_user_id;
        self.staged.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        self.staged.users.insert(id, user.clone());
        Ok(user)
    }

    async fn update_user(&mut self, id: i64, changes: UserChanges) -> UserResult<User> {
        if let Some(email) = changes.email.as_deref() {
            if self.staged.email_taken(email, Some(id)) {
                return Err(UserError::DuplicateEmail(email.to_string()));
            }
        }

        let user = self
            .staged
            .users
            .get_mut(&id)
            .ok_or(UserError::NotFound(id))?;
        user.apply(changes);
        Ok(user.clone())
    }

    async fn delete_user(&mut self, id: i64) -> UserResult<()> {
        self.staged
            .users
            .remove(&id)
            .ok_or(UserError::NotFound(id))?;
        self.staged.role_user.retain(|(user_id, _)| *user_id != id);
        Ok(())
    }

    async fn sync_roles(&mut self, user_id: i64, role_ids: &[i64]) -> UserResult<()> {
        if !self.staged.users.contains_key(&user_id) {
            return Err(UserError::NotFound(user_id));
        }

        let wanted: BTreeSet<i64> = role_ids.iter().copied().collect();
        let missing: Vec<i64> = wanted
            .iter()
            .copied()
            .filter(|id| !self.staged.roles.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(UserError::InvalidRoles(missing));
        }

        self.staged.role_user.retain(|(uid, _)| *uid != user_id);
        self.staged
            .role_user
            .extend(wanted.into_iter().map(|role_id| (user_id, role_id)));
        Ok(())
    }

    async fn commit(self) -> UserResult<()> {
        let Self { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self) -> UserResult<()> {
        Ok(())
    }
}
