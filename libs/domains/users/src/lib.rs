//! Users Domain
//!
//! CRUD over user accounts and their role assignments. Every operation is
//! gated by a [`UserPolicy`] and every write runs inside one
//! [`UserTransaction`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints behind the JWT guard
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Service   │  ← Policy checks, hashing, transaction scoping
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │ Repository  │  ← Reads + transactional writes (Postgres, in-memory)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Records, projections, request bodies
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use axum_helpers::{JwtAuth, JwtConfig};
//! use domain_users::{handlers, InMemoryUserRepository, UserService};
//!
//! # fn example(config: JwtConfig) {
//! let service = UserService::new(InMemoryUserRepository::new());
//! let router = handlers::router(service, JwtAuth::new(&config));
//! # }
//! ```

pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod policy;
pub mod postgres;
pub mod repository;
pub mod service;

pub use error::{UserError, UserResult};
pub use models::{CreateUser, NewUser, Role, UpdateUser, User, UserChanges, UserDetail, UserSummary};
pub use policy::{Action, Actor, RoleBasedUserPolicy, Target, UserPolicy};
pub use postgres::PgUserRepository;
pub use repository::{InMemoryUserRepository, UserRepository, UserTransaction};
pub use service::UserService;
