//! Authorization gate for the user resource.
//!
//! Every call site hands the policy either the user type, the concrete
//! fetched record, or [`Target::Missing`] when the lookup came back empty,
//! so a policy never has to guess about absent records.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_helpers::{AppError, JwtClaims};
use serde::Serialize;
use std::fmt;

use crate::models::User;

/// Name of the role that may perform every action.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Index,
    Store,
    Show,
    Update,
    Destroy,
    /// Replace a user's role set
    AssignRoles,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Index => "index",
            Action::Store => "store",
            Action::Show => "show",
            Action::Update => "update",
            Action::Destroy => "destroy",
            Action::AssignRoles => "assign_roles",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Type-level check (`index`, `store`)
    Type,
    Instance(&'a User),
    /// The requested id does not exist
    Missing(i64),
}

impl Target<'_> {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Target::Type => None,
            Target::Instance(user) => Some(user.id),
            Target::Missing(id) => Some(*id),
        }
    }
}

/// Authenticated caller, built from the verified token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(id: i64, roles: Vec<String>) -> Self {
        Self { id, roles }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl TryFrom<&JwtClaims> for Actor {
    type Error = AppError;

    fn try_from(claims: &JwtClaims) -> Result<Self, Self::Error> {
        let id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Unauthorized("Invalid token subject".to_string()))?;
        Ok(Self::new(id, claims.roles.clone()))
    }
}

/// Requires the JWT middleware to have run on the route.
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<JwtClaims>()
            .ok_or_else(|| AppError::Unauthorized("No token provided".to_string()))?;
        Actor::try_from(claims)
    }
}

pub trait UserPolicy: Send + Sync {
    fn can_perform(&self, actor: &Actor, action: Action, target: Target<'_>) -> bool;
}

/// Admins may do anything; everyone else may only view and edit themselves,
/// without touching their own roles.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleBasedUserPolicy;

impl UserPolicy for RoleBasedUserPolicy {
    fn can_perform(&self, actor: &Actor, action: Action, target: Target<'_>) -> bool {
        if actor.has_role(ADMIN_ROLE) {
            return true;
        }

        match action {
            Action::Show | Action::Update => target.user_id() == Some(actor.id),
            Action::Index | Action::Store | Action::Destroy | Action::AssignRoles => false,
        }
    }
}
