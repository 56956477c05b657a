//! Authentication models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Well-known permission tags. Checks are plain set membership.
pub struct Permission;

impl Permission {
    pub const READ: &'static str = "read";
    pub const WRITE: &'static str = "write";
    pub const ADMIN: &'static str = "admin";
    pub const CONFIG: &'static str = "config";
    pub const MODBUS: &'static str = "modbus";
}

/// User account
#[derive(Debug, Clone)]
pub struct User {
    /// Unique username, the registry key
    pub username: String,
    /// Hex digest of password and salt
    pub password_hash: String,
    /// Informational role label
    pub role: String,
    /// Granted permission tags
    pub permissions: BTreeSet<String>,
    /// When the account was created
    pub created_at: DateTime<Utc>,
    /// Last successful login
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new<I, P>(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        role: impl Into<String>,
        permissions: I,
        created_at: DateTime<Utc>,
    ) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            role: role.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            created_at,
            last_login_at: None,
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Public view of the account, without the password hash
    pub fn view(&self) -> UserView {
        UserView {
            username: self.username.clone(),
            role: self.role.clone(),
            permissions: self.permissions.iter().cloned().collect(),
            last_login: self.last_login_at,
        }
    }
}

/// User information in responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserView {
    /// Username
    pub username: String,
    /// Role label
    pub role: String,
    /// Granted permissions, sorted
    pub permissions: Vec<String>,
    /// Last successful login, if any
    pub last_login: Option<DateTime<Utc>>,
}

/// A live login. Refers to its user by username.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque bearer token, the registry key
    pub token: String,
    /// Owning user
    pub username: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Fixed at creation; activity never moves it
    pub expires_at: DateTime<Utc>,
    /// Last successful validation
    pub last_accessed_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        token: String,
        username: String,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            token,
            username,
            created_at: now,
            expires_at: now + ttl,
            last_accessed_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Record activity. Only `last_accessed_at` changes.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }

    pub fn view(&self, user: UserView) -> SessionView {
        SessionView {
            token: self.token.clone(),
            user,
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_accessed: self.last_accessed_at,
        }
    }
}

/// Session information in responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    /// Session token
    pub token: String,
    /// Owner of the session
    pub user: UserView,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session expires
    pub expires_at: DateTime<Utc>,
    /// Last activity
    pub last_accessed: DateTime<Utc>,
}

/// A validated session together with a snapshot of its user
#[derive(Debug, Clone)]
pub struct Principal {
    pub session: Session,
    pub user: User,
}

impl Principal {
    pub fn username(&self) -> &str {
        &self.user.username
    }
}

/// Login credentials
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Login response with token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}
