use axum::http::StatusCode;
use thiserror::Error;

/// Everything that can end a request early.
///
/// Only the first two variants are client errors; the rest surface as 500
/// with the failure's own description, which is what callers have always
/// received.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("{0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("database call timed out after {0} seconds")]
    Timeout(u64),
}

impl ApiError {
    pub fn invalid(name: &'static str, reason: impl ToString) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
