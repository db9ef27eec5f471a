use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use sea_orm::DbErr;
use thiserror::Error;

use crate::policy::Action;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("User {0} not found")]
    NotFound(i64),

    #[error("This action is unauthorized: {0}")]
    Forbidden(Action),

    #[error("invalid role ids: {0:?}")]
    InvalidRoles(Vec<i64>),

    #[error("email '{0}' is already taken")]
    DuplicateEmail(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Failed to create user: {0}")]
    StoreFailed(String),

    #[error("Failed to update user: {0}")]
    UpdateFailed(String),

    #[error("Failed to delete user: {0}")]
    DeleteFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub type UserResult<T> = Result<T, UserError>;

impl UserError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, UserError::Forbidden(_))
    }
}

/// Convert UserError to AppError for standardized error responses
impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound(_) => AppError::NotFound(err.to_string()),
            UserError::Forbidden(action) => {
                tracing::debug!(%action, "Policy denied user action");
                AppError::Forbidden("This action is unauthorized".to_string())
            }
            UserError::StoreFailed(_) | UserError::UpdateFailed(_) | UserError::DeleteFailed(_) => {
                AppError::UnprocessableEntity(err.to_string())
            }
            // Only surface outside a write sequence if a store is misused
            UserError::InvalidRoles(_) | UserError::DuplicateEmail(_) => {
                AppError::UnprocessableEntity(err.to_string())
            }
            UserError::PasswordHash(msg) => {
                tracing::error!("Password hash error: {msg}");
                AppError::InternalServerError("An internal error occurred".to_string())
            }
            UserError::Database(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
