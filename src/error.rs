use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::crypto::token::IdentityError;

/// Envelope `code` for a successful response.
pub const CODE_SUCCESS: i32 = 0;
/// Envelope `code` for a rejected request parameter.
pub const CODE_PARAMETER_ERROR: i32 = 40000;
/// Envelope `code` for a missing or unusable identity.
pub const CODE_AUTH_ERROR: i32 = 40100;
/// Envelope `code` for a throttled client.
pub const CODE_RATE_LIMITED: i32 = 42900;
/// Envelope `code` for an unexpected server fault.
pub const CODE_SERVER_ERROR: i32 = 50000;
/// Envelope `code` for a failed WeChat exchange.
pub const CODE_WX_FAILED: i32 = 50001;
/// Envelope `code` for a failed database operation.
pub const CODE_DB_FAILED: i32 = 50002;

/// Message returned for every token failure, whatever the cause.
pub const MSG_INVALID_TOKEN: &str = "invalid token";

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A pool construction error.
    #[error("Pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A token or key error.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The WeChat code2session exchange failed.
    #[error("WeChat authorization failed: {0}")]
    WxFailed(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A column was missing or had an unexpected type.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    fn status_code_message(&self) -> (StatusCode, i32, String) {
        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, CODE_DB_FAILED, "database error".to_string())
            }

            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, CODE_DB_FAILED, "database error".to_string())
            }

            AppError::CreatePool(e) => {
                tracing::error!("Pool creation error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, CODE_DB_FAILED, "database error".to_string())
            }

            AppError::MissingData(column) => {
                tracing::error!("Missing data in column: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, CODE_DB_FAILED, "database error".to_string())
            }

            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, CODE_SERVER_ERROR, "server error".to_string())
            }

            AppError::Identity(e) if e.is_unauthenticated() => {
                tracing::warn!("Token rejected: {}", e);
                (StatusCode::UNAUTHORIZED, CODE_AUTH_ERROR, MSG_INVALID_TOKEN.to_string())
            }

            AppError::Identity(e)
                if matches!(e, IdentityError::EmptySubject | IdentityError::SubjectTooLong(_)) =>
            {
                tracing::debug!("Subject rejected: {}", e);
                (StatusCode::BAD_REQUEST, CODE_PARAMETER_ERROR, e.to_string())
            }

            AppError::Identity(e) => {
                tracing::error!("Identity error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, CODE_SERVER_ERROR, "server error".to_string())
            }

            AppError::Authentication(msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, CODE_AUTH_ERROR, msg.clone())
            }

            AppError::WxFailed(msg) => {
                tracing::error!("WeChat authorization failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    CODE_WX_FAILED,
                    "wechat authorization failed".to_string(),
                )
            }

            AppError::Validation(msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, CODE_PARAMETER_ERROR, msg.clone())
            }

            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, CODE_SERVER_ERROR, "server error".to_string())
            }

            AppError::RateLimitExceeded(msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, CODE_RATE_LIMITED, msg.clone())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.status_code_message();

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "code": code,
            "msg": message,
            "data": {}
        }))
        .unwrap_or_else(|_| r#"{"code":50000,"msg":"server error","data":{}}"#.to_string());

        (status, [(axum::http::header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(err: AppError) -> (StatusCode, i32, String) {
        err.status_code_message()
    }

    #[test]
    fn token_failures_are_indistinguishable_to_clients() {
        let malformed = parts(IdentityError::MalformedToken.into());
        let forged = parts(IdentityError::AuthenticationFailed.into());
        let expired = parts(IdentityError::Expired.into());

        assert_eq!(malformed, (StatusCode::UNAUTHORIZED, CODE_AUTH_ERROR, MSG_INVALID_TOKEN.to_string()));
        assert_eq!(malformed, forged);
        assert_eq!(malformed, expired);
    }

    #[test]
    fn key_unavailable_is_a_server_error() {
        let (status, code, msg) = parts(IdentityError::KeyUnavailable("pool timed out".into()).into());

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, CODE_SERVER_ERROR);
        assert!(!msg.contains("pool"));
    }

    #[test]
    fn empty_subject_is_a_parameter_error() {
        let (status, code, _) = parts(IdentityError::EmptySubject.into());

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, CODE_PARAMETER_ERROR);
    }

    #[test]
    fn wechat_failure_uses_provider_code() {
        let (status, code, msg) = parts(AppError::WxFailed("errcode 40029".into()));

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, CODE_WX_FAILED);
        assert!(!msg.contains("40029"));
    }
}
