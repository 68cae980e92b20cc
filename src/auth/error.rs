//! Error taxonomy for the authentication core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Token verification and signing failures
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is expired")]
    Expired,

    #[error("invalid token")]
    Invalid,

    #[error("invalid token type")]
    WrongPurpose,

    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Failures raised by the credential, invitation and presence stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("record already exists")]
    Conflict,

    #[error("store call timed out")]
    Timeout,

    #[error("store lock poisoned")]
    Poisoned,

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Unique-constraint violations become `Conflict`
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict
            }
            other => StoreError::Sqlite(other),
        }
    }
}

/// Errors surfaced by the auth orchestrator and the request gate
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    MalformedInput(String),

    #[error("missing token")]
    MissingToken,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("invalid invitation: {0}")]
    InvalidInvite(#[source] TokenError),

    #[error("email does not match the invitation")]
    InviteEmailMismatch,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found")]
    CredentialNotFound,

    #[error("a user with this email already exists")]
    AccountExists,

    #[error("{0}")]
    AlreadyExists(String),

    #[error("insufficient role")]
    Forbidden,

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("password hashing failed: {0}")]
    Password(String),

    #[error("email delivery failed: {0}")]
    EmailDelivery(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MalformedInput(_)
            | AuthError::InvalidInvite(_)
            | AuthError::InviteEmailMismatch
            | AuthError::AccountExists => StatusCode::BAD_REQUEST,
            AuthError::Token(TokenError::Signing(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::MissingToken | AuthError::Token(_) | AuthError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::CredentialNotFound => StatusCode::NOT_FOUND,
            AuthError::AlreadyExists(_) => StatusCode::CONFLICT,
            AuthError::Store(_) | AuthError::Password(_) | AuthError::EmailDelivery(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            log::error!("Internal auth failure: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
