//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::meter::MeterError;

/// Every failure a route can answer with
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bad username or password at login
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, unknown or expired token
    #[error("{0}")]
    AuthRequired(String),

    /// Valid session without the route's permission
    #[error("Insufficient permissions. Required: {0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Route exists, method does not
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Device(String),

    /// Detail is logged, never returned
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials | ApiError::AuthRequired(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Device(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::AuthRequired(_) => Some("AUTH_REQUIRED"),
            ApiError::Forbidden(_) => Some("FORBIDDEN"),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!("Internal error: {}", detail);
        }

        let body = match self.code() {
            Some(code) => json!({ "error": self.to_string(), "code": code }),
            None => json!({ "error": self.to_string() }),
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<MeterError> for ApiError {
    fn from(err: MeterError) -> Self {
        match err {
            MeterError::NoResponse => ApiError::NotFound("No response received".to_string()),
            other => ApiError::Device(other.to_string()),
        }
    }
}
