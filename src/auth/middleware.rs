//! Authentication middleware
//!
//! Every protected route group is wrapped by [`require_auth`] with a
//! [`Guard`] naming the permission that group needs. The middleware
//! extracts the bearer token, validates it, checks the permission and
//! hands the [`Principal`] to the handler as a request extension.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::api::error::ApiError;
use crate::auth::models::Principal;
use crate::auth::session::AuthenticationManager;

/// Extract the bearer token from the Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware state: who validates, and what the route requires
#[derive(Clone)]
pub struct Guard {
    auth: Arc<AuthenticationManager>,
    permission: Option<&'static str>,
}

impl Guard {
    /// Any valid session passes
    pub fn authenticated(auth: Arc<AuthenticationManager>) -> Self {
        Self {
            auth,
            permission: None,
        }
    }

    /// A valid session holding `permission` passes
    pub fn permission(auth: Arc<AuthenticationManager>, permission: &'static str) -> Self {
        Self {
            auth,
            permission: Some(permission),
        }
    }
}

/// Middleware for requiring authentication
pub async fn require_auth(
    State(guard): State<Guard>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::AuthRequired("No authentication token provided".to_string()))?;

    let principal = guard
        .auth
        .validate_session(&token)
        .await
        .ok_or_else(|| ApiError::AuthRequired("Invalid or expired session".to_string()))?;

    if let Some(permission) = guard.permission {
        if !principal.user.has_permission(permission) {
            tracing::warn!(
                "User '{}' denied {} {}: missing '{}' permission",
                principal.username(),
                req.method(),
                req.uri().path(),
                permission
            );
            return Err(ApiError::Forbidden(permission.to_string()));
        }
    }

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
