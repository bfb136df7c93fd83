//! Unified application error model and mapping helpers.
//! Every gate, store call and handler reports failures through `AppError`; the HTTP layer
//! turns it into a status code plus a stable, generic body.

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::storage::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Unauthenticated { code: String, message: String },
    Forbidden { code: String, message: String },
    Conflict { code: String, message: String },
    NotFound { code: String, message: String },
    Validation { code: String, message: String },
    Internal { code: String, message: String },
}

pub const MSG_BAD_CREDENTIALS: &str = "incorrect username or password";
pub const MSG_UNAUTHENTICATED: &str = "could not validate credentials";
pub const MSG_FORBIDDEN: &str = "insufficient privileges";
pub const MSG_INTERNAL: &str = "internal server error";

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Unauthenticated { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Validation { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Unauthenticated { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Validation { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn unauthenticated<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unauthenticated { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn validation<S: Into<String>>(code: S, msg: S) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Generic 401 used for every token, resolution and login failure.
    pub fn bad_token() -> Self { Self::unauthenticated("unauthenticated", MSG_UNAUTHENTICATED) }
    pub fn bad_credentials() -> Self { Self::unauthenticated("invalid_credentials", MSG_BAD_CREDENTIALS) }
    pub fn insufficient_role() -> Self { Self::forbidden("forbidden", MSG_FORBIDDEN) }
    pub fn username_unavailable() -> Self { Self::conflict("username_unavailable", "username unavailable") }
    pub fn user_not_found() -> Self { Self::not_found("user_not_found", "user not found") }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Unauthenticated { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            // Duplicate usernames are reported as plain request errors, not 409.
            AppError::Conflict { .. } => 400,
            AppError::Validation { .. } => 400,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("internal failure: {err:#}");
        AppError::internal("internal", MSG_INTERNAL)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername | StoreError::DuplicateEmail => AppError::username_unavailable(),
            StoreError::NotFound(_) => AppError::user_not_found(),
            other => {
                tracing::error!("user store failure: {other}");
                AppError::internal("store_unavailable", MSG_INTERNAL)
            }
        }
    }
}

/// Unreadable request bodies get the same error envelope as every other failure.
pub fn invalid_body() -> AppError {
    AppError::validation("invalid_body", "request body is not valid")
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(status = %rejection.status(), "json body rejected: {}", rejection.body_text());
        invalid_body()
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        tracing::debug!(status = %rejection.status(), "form body rejected: {}", rejection.body_text());
        invalid_body()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "status": "error",
            "code": self.code_str(),
            "detail": self.message(),
        }));
        let mut resp = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            resp.headers_mut().insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        resp
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
