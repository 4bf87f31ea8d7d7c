use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::guard::Redirect;

/// AuthError
///
/// Failures from the identity provider. User-correctable; shown inline.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid or expired session token")]
    InvalidToken,
    #[error("identity provider unavailable: {0}")]
    Provider(String),
}

/// DirectoryError
///
/// The user directory could not be reached. Absorbed by the session resolver,
/// never surfaced to a client.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// StoreError
///
/// Content store failures. Surfaced to the initiating request only.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content store query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("content store unavailable: {0}")]
    Unavailable(String),
    #[error("background write task failed: {0}")]
    Task(String),
}

/// AppError
///
/// The error taxonomy of the HTTP surface. Every variant ends in a
/// degraded-but-safe response; none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("sign in required")]
    Unauthorized,
    #[error("admin role required")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("an identical change is already in progress")]
    WriteConflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<&'static str>,
    retryable: bool,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(AuthError::Provider(_)) => StatusCode::BAD_GATEWAY,
            AppError::Auth(_) | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::WriteConflict => StatusCode::CONFLICT,
            AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "auth_error",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::WriteConflict => "write_conflict",
            AppError::Store(_) => "store_error",
        }
    }

    fn redirect(&self) -> Option<Redirect> {
        match self {
            AppError::Unauthorized => Some(Redirect::SignIn),
            AppError::Forbidden => Some(Redirect::SignInUnauthorized),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::WriteConflict | AppError::Store(_) | AppError::Auth(AuthError::Provider(_))
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Store internals stay in the logs; clients get a generic retry message.
        let message = match &self {
            AppError::Store(e) => {
                tracing::error!(error = %e, "content store failure");
                "the content store is temporarily unavailable, please retry".to_string()
            }
            AppError::Auth(AuthError::Provider(e)) => {
                tracing::error!(error = %e, "identity provider failure");
                "sign in is temporarily unavailable, please retry".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.code(),
            message,
            redirect: self.redirect().map(|r| r.target()),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}
