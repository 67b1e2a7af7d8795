pub mod macros;
pub mod middleware_handling;

#[doc(hidden)]
pub mod __private {
    pub use anyhow;
    pub use tracing;
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    ConfigError(anyhow::Error),
    DatabaseError(anyhow::Error),
    CacheError(anyhow::Error),
    ServerError(anyhow::Error),
    ValidationError(String),
    NotFoundError(String),
    AuthenticationError(String),
    /// Wrong identifier or wrong password. Both cases render identically.
    InvalidCredentials,
    ExpiredToken,
    InvalidSignature,
    MalformedToken(String),
    WrongTokenType { expected: String, found: String },
    RevokedToken,
    /// Valid token, insufficient permission.
    Unauthorized(String),
    RateLimitError(String),
    ResourceExistsError(String),
    ResourceInUse(String),
}

impl AppError {
    // Resource errors
    pub fn resource_not_found(resource_type: &str, identifier: &str) -> Self {
        Self::NotFoundError(format!(
            "{} with identifier '{}' was not found.",
            resource_type, identifier
        ))
    }

    pub fn resource_exists(resource_type: &str, field: &str, value: &str) -> Self {
        Self::ResourceExistsError(format!(
            "{} with {} '{}' already exists.",
            resource_type, field, value
        ))
    }

    // Validation errors
    pub fn validation(field: &str, message: &str) -> Self {
        Self::ValidationError(format!("Validation failed for '{}': {}", field, message))
    }

    pub fn missing_permission(permission: &str) -> Self {
        Self::Unauthorized(format!(
            "The '{}' permission is required for this operation.",
            permission
        ))
    }

    /// Status and stable machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Self::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"),
            Self::CacheError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR"),
            Self::ServerError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERVER_ERROR"),
            Self::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::NotFoundError(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::AuthenticationError(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            Self::ExpiredToken => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            Self::InvalidSignature => (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE"),
            Self::MalformedToken(_) => (StatusCode::UNAUTHORIZED, "MALFORMED_TOKEN"),
            Self::WrongTokenType { .. } => (StatusCode::UNAUTHORIZED, "WRONG_TOKEN_TYPE"),
            Self::RevokedToken => (StatusCode::UNAUTHORIZED, "TOKEN_REVOKED"),
            Self::Unauthorized(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::RateLimitError(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT"),
            Self::ResourceExistsError(_) => (StatusCode::CONFLICT, "RESOURCE_EXISTS"),
            Self::ResourceInUse(_) => (StatusCode::CONFLICT, "RESOURCE_IN_USE"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::ServerError(error)
    }
}

// Human-friendly error messages
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Self::DatabaseError(e) => write!(f, "Database error: {}", e),
            Self::CacheError(e) => write!(f, "Cache error: {}", e),
            Self::ServerError(e) => write!(f, "Server error: {}", e),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::NotFoundError(msg) => write!(f, "Not found: {}", msg),
            Self::AuthenticationError(msg) => write!(f, "Authentication error: {}", msg),
            Self::InvalidCredentials => write!(f, "Invalid username or password"),
            Self::ExpiredToken => write!(f, "Token has expired"),
            Self::InvalidSignature => write!(f, "Token signature is invalid"),
            Self::MalformedToken(msg) => write!(f, "Malformed token: {}", msg),
            Self::WrongTokenType { expected, found } => {
                write!(f, "Wrong token type: expected {}, got {}", expected, found)
            }
            Self::RevokedToken => write!(f, "Token has been revoked"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Self::RateLimitError(msg) => write!(f, "Rate limit exceeded: {}", msg),
            Self::ResourceExistsError(msg) => write!(f, "Resource exists: {}", msg),
            Self::ResourceInUse(msg) => write!(f, "Resource in use: {}", msg),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        let (error_message, help_text) = match &self {
            Self::ValidationError(msg) => (
                msg.clone(),
                Some("Please review your input and try again."),
            ),
            Self::NotFoundError(msg) => (
                msg.clone(),
                Some("The requested resource was not found."),
            ),
            Self::AuthenticationError(msg) => (
                msg.clone(),
                Some("Please log in to access this resource."),
            ),
            Self::InvalidCredentials => (
                "Invalid username or password.".to_string(),
                Some("Please check your credentials and try again."),
            ),
            Self::ExpiredToken => (
                "Your session has expired.".to_string(),
                Some("Refresh your access token or log in again."),
            ),
            Self::InvalidSignature | Self::MalformedToken(_) => (
                "Invalid authentication token.".to_string(),
                Some("Please log in again."),
            ),
            Self::WrongTokenType { .. } => (
                "This token cannot be used here.".to_string(),
                Some("Use an access token for API calls and a refresh token for /refresh/."),
            ),
            Self::RevokedToken => (
                "This refresh token is no longer valid.".to_string(),
                Some("Please log in again."),
            ),
            Self::Unauthorized(msg) => (
                msg.clone(),
                Some("You don't have permission to access this resource."),
            ),
            Self::RateLimitError(msg) => (msg.clone(), Some("Please try again later.")),
            Self::ResourceExistsError(msg) | Self::ResourceInUse(msg) => (msg.clone(), None),
            Self::ConfigError(_) => ("System configuration error".to_string(), None),
            Self::DatabaseError(_) => ("Database operation failed".to_string(), None),
            Self::CacheError(_) | Self::ServerError(_) => {
                ("Internal server error".to_string(), None)
            }
        };

        // Log the error with context
        let log_message = format!("[{}] {}: {}", error_code, status, self);
        if status.is_server_error() {
            tracing::error!(error_code = error_code, status_code = %status.as_u16(), %error_message, "{}", log_message);
        } else {
            tracing::warn!(error_code = error_code, status_code = %status.as_u16(), %error_message, "{}", log_message);
        }

        let body = Json(ErrorResponse {
            status: status.to_string(),
            message: error_message,
            code: error_code.to_string(),
            details: if status.is_server_error() {
                None // Don't expose internal error details to clients
            } else {
                Some(self.to_string())
            },
            help: help_text.map(String::from),
        });

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

// Extension trait to wrap foreign errors with specific context
pub trait AppErrorExt<T> {
    fn config_err(self) -> AppResult<T>;
    fn db_err(self) -> AppResult<T>;
    fn cache_err(self) -> AppResult<T>;
    fn server_err(self) -> AppResult<T>;
}

impl<T, E> AppErrorExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn config_err(self) -> AppResult<T> {
        self.map_err(|e| AppError::ConfigError(e.into()))
    }

    fn db_err(self) -> AppResult<T> {
        self.map_err(|e| AppError::DatabaseError(e.into()))
    }

    fn cache_err(self) -> AppResult<T> {
        self.map_err(|e| AppError::CacheError(e.into()))
    }

    fn server_err(self) -> AppResult<T> {
        self.map_err(|e| AppError::ServerError(e.into()))
    }
}
