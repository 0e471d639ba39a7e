use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::PoolError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::availability::DateRange;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("the requested dates are not available")]
    Conflict(Vec<DateRange>),

    #[error("missing or invalid admin token")]
    Unauthorized,

    #[error("access code is invalid or expired")]
    AccessDenied,

    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("connection pool error: {0}")]
    Pool(#[from] bb8::RunError<PoolError>),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::Database(DieselError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::AccessDenied => StatusCode::FORBIDDEN,
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the error is a violation of the named database constraint.
    pub fn violates(&self, constraint: &str) -> bool {
        match self {
            AppError::Database(e) => violates(e, constraint),
            _ => false,
        }
    }
}

pub fn violates(err: &DieselError, constraint: &str) -> bool {
    match err {
        DieselError::DatabaseError(_, info) => info.constraint_name() == Some(constraint),
        _ => false,
    }
}

pub fn is_foreign_key_violation(err: &AppError) -> bool {
    matches!(
        err,
        AppError::Database(DieselError::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            _
        ))
    )
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<DateRange>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let conflicts = match self {
            AppError::Conflict(ranges) => Some(ranges),
            _ => None,
        };

        (
            status,
            Json(ErrorResponse {
                success: false,
                error: message,
                conflicts,
            }),
        )
            .into_response()
    }
}
