//! SeaORM entities for the `users`, `roles` and `role_user` tables.

pub mod role;
pub mod role_user;
pub mod user;
