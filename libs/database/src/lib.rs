//! PostgreSQL connectivity for the workspace services.
//!
//! # Features
//!
//! - `postgres` (default): SeaORM connection pool, health check, migration runner
//! - `config`: `core_config::FromEnv` for [`postgres::PostgresConfig`]
//!
//! ```ignore
//! use database::{postgres, RetryConfig};
//!
//! let db = postgres::connect_with_retry(config, RetryConfig::default()).await?;
//! postgres::run_migrations::<migration::Migrator>(&db, "users_api").await?;
//! ```

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use common::{DatabaseError, DatabaseResult, RetryConfig, retry_with_backoff};
