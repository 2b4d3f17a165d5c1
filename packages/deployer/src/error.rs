use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::archive::ExtractError;
use crate::executor::ExecError;
use crate::patch::RenderError;

/// Service-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Exactly one of applicationId or composeId must be provided")]
    InvalidPatchOwner,

    #[error("Patch not found: {0}")]
    PatchNotFound(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(DbErr),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                tracing::warn!("Unique constraint violation: {detail}");
                AppError::Conflict(detail)
            }
            _ => AppError::Database(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
