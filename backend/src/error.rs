//! Error handling for the Central Kitchen Platform
//!
//! Every failure maps to a stable error code so clients can tell the kinds
//! apart; storage details are logged but never returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Account is deactivated")]
    AccountDisabled,

    /// The actor's role or store affiliation does not allow the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Insufficient quantity: {0}")]
    InsufficientQuantity(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::InvalidToken(_) => "INVALID_TOKEN",
            AppError::AccountDisabled => "ACCOUNT_DISABLED",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::InsufficientQuantity(_) => "INSUFFICIENT_QUANTITY",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials | AppError::InvalidToken(_) | AppError::AccountDisabled => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::Validation { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidTransition(_) | AppError::InsufficientQuantity(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::DatabaseError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, field) = match &self {
            AppError::InvalidCredentials => ("Invalid username or password".to_string(), None),
            AppError::InvalidToken(msg) => (format!("Not authorized, {}", msg), None),
            AppError::AccountDisabled => ("Account is deactivated".to_string(), None),
            AppError::Unauthorized(msg) => (msg.clone(), None),
            AppError::Validation { field, message } => (message.clone(), Some(field.clone())),
            AppError::ValidationError(msg) => (msg.clone(), None),
            AppError::Conflict(msg) => (msg.clone(), None),
            AppError::NotFound(resource) => (format!("{} not found", resource), None),
            AppError::InvalidTransition(msg) => (msg.clone(), None),
            AppError::InsufficientQuantity(msg) => (msg.clone(), None),
            AppError::DatabaseError(_) => ("A database error occurred".to_string(), None),
            AppError::Internal(_) => ("An internal server error occurred".to_string(), None),
        };

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        match field_errors.iter().next() {
            Some((field, errs)) => {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field));
                AppError::validation(field, message)
            }
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
