//! Unified application error model and mapping helpers.
//! Every module that crosses a request boundary reports failures as `AppError`;
//! the HTTP layer turns them into a status code plus a short message or a
//! redirect back to the sign-in page.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::StoreError;
use crate::template::TemplateError;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// No session, unknown session, or the identity provider rejected the token.
    #[error("{code}: {message}")]
    Authentication { code: String, message: String },
    /// Signed in, but not allowed to touch the target student or admin-only action.
    #[error("{code}: {message}")]
    Authorization { code: String, message: String },
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    #[error("{code}: {message}")]
    UserInput { code: String, message: String },
    #[error("{code}: {message}")]
    Conflict { code: String, message: String },
    /// Identity provider or document store unreachable / failing.
    #[error("{code}: {message}")]
    Upstream { code: String, message: String },
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Authentication { code, .. }
            | AppError::Authorization { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::UserInput { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Upstream { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Authentication { message, .. }
            | AppError::Authorization { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::UserInput { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Upstream { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn authentication<S: Into<String>>(code: S, msg: S) -> Self { AppError::Authentication { code: code.into(), message: msg.into() } }
    pub fn authorization<S: Into<String>>(code: S, msg: S) -> Self { AppError::Authorization { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn upstream<S: Into<String>>(code: S, msg: S) -> Self { AppError::Upstream { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Authentication { .. } => 401,
            AppError::Authorization { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::UserInput { .. } => 400,
            AppError::Conflict { .. } => 409,
            // identity provider failures are a bad gateway, store failures an unavailable dependency
            AppError::Upstream { code, .. } if code.starts_with("identity") => 502,
            AppError::Upstream { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    pub fn is_authentication(&self) -> bool { matches!(self, AppError::Authentication { .. }) }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(key) => AppError::conflict("store_conflict".to_string(), format!("concurrent update on {key}")),
            StoreError::InvalidKey(key) => AppError::user("invalid_key".to_string(), format!("'{key}' cannot be used as a storage key")),
            other => AppError::upstream("store_unavailable".to_string(), other.to_string()),
        }
    }
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        AppError::internal("template_error".to_string(), err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

/// Where browsers land when their session is missing or rejected.
pub fn signin_redirect_location(reason: &str) -> String {
    format!("/#error:{}", urlencoding::encode(reason))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_authentication() {
            let location = signin_redirect_location(self.message());
            let mut resp = StatusCode::SEE_OTHER.into_response();
            if let Ok(v) = HeaderValue::from_str(&location) {
                resp.headers_mut().insert(header::LOCATION, v);
            }
            return resp;
        }
        if matches!(self, AppError::Upstream { .. } | AppError::Internal { .. }) {
            // runs inside the request span, which carries the request id
            tracing::error!(target: "service_hours::http", code = self.code_str(), message = self.message(), "request failed");
        }
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // internal details stay in the log, not in the page
        let body = match &self {
            AppError::Internal { .. } => "internal server error".to_string(),
            other => other.message().to_string(),
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
