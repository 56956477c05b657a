//! Session management
//!
//! [`AuthenticationManager`] owns the user registry and the session registry.
//! Each registry sits behind its own lock. Operations that touch both take
//! the user lock first; validation never holds both at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::clock::{Clock, SystemClock};
use crate::auth::models::{LoginResponse, Principal, Session, SessionView, User, UserView};
use crate::auth::password::{generate_token, PasswordHasher};
use crate::config::AuthConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
}

/// User and session registries
pub struct AuthenticationManager {
    hasher: PasswordHasher,
    session_ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    users: RwLock<HashMap<String, User>>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthenticationManager {
    /// Create an empty manager on the wall clock
    pub fn new(salt: impl Into<String>, session_ttl: chrono::Duration) -> Self {
        Self::with_clock(salt, session_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        salt: impl Into<String>,
        session_ttl: chrono::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hasher: PasswordHasher::new(salt),
            session_ttl,
            clock,
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Build a manager seeded with the configured (or default) accounts
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::from_config_with_clock(config, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let manager = Self::with_clock(config.salt.clone(), config.session_ttl(), clock);
        let now = manager.clock.now();

        let users: HashMap<String, User> = config
            .seed_users()
            .into_iter()
            .map(|u| {
                let hash = manager.hasher.hash(&u.password);
                let user = User::new(u.username.clone(), hash, u.role, u.permissions, now);
                (u.username, user)
            })
            .collect();

        info!("Initialized {} users", users.len());
        Self {
            users: RwLock::new(users),
            ..manager
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        self.session_ttl
    }

    /// Check credentials and open a new session
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, AuthError> {
        let now = self.clock.now();
        let mut users = self.users.write().await;

        let Some(user) = users.get_mut(username) else {
            warn!("Authentication failed: user '{}' not found", username);
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.password_hash) {
            warn!("Authentication failed: invalid password for user '{}'", username);
            return Err(AuthError::InvalidCredentials);
        }

        let session = {
            let mut sessions = self.sessions.write().await;
            let mut token = generate_token();
            while sessions.contains_key(&token) {
                token = generate_token();
            }
            let session = Session::new(token.clone(), user.username.clone(), now, self.session_ttl);
            sessions.insert(token, session.clone());
            session
        };

        user.last_login_at = Some(now);
        info!("User '{}' authenticated successfully", username);

        Ok(LoginResponse {
            token: session.token,
            user: user.view(),
            expires_at: session.expires_at,
        })
    }

    /// Resolve a token to a live session.
    ///
    /// An expired session is removed on the way out. A live one has its
    /// `last_accessed_at` refreshed; its expiry never moves.
    pub async fn validate_session(&self, token: &str) -> Option<Principal> {
        let now = self.clock.now();

        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.get_mut(token)?;
            if session.is_expired_at(now) {
                sessions.remove(token);
                debug!("Session {}... expired and removed", token_prefix(token));
                return None;
            }
            session.touch(now);
            session.clone()
        };

        let user = self.users.read().await.get(&session.username).cloned();
        match user {
            Some(user) => Some(Principal { session, user }),
            None => {
                // owner removed after we looked the session up
                self.sessions.write().await.remove(token);
                None
            }
        }
    }

    /// Revoke a session. Returns whether anything was removed.
    pub async fn logout(&self, token: &str) -> bool {
        match self.sessions.write().await.remove(token) {
            Some(session) => {
                info!("User '{}' logged out", session.username);
                true
            }
            None => false,
        }
    }

    /// True only for a live session whose user holds `permission`
    pub async fn check_permission(&self, token: &str, permission: &str) -> bool {
        self.validate_session(token)
            .await
            .is_some_and(|principal| principal.user.has_permission(permission))
    }

    pub async fn get_user_from_token(&self, token: &str) -> Option<User> {
        self.validate_session(token).await.map(|p| p.user)
    }

    /// Replace a user's password hash. Existing sessions stay valid.
    pub async fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> bool {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(username) else {
            return false;
        };

        if !self.hasher.verify(old_password, &user.password_hash) {
            warn!("Password change failed for '{}': invalid old password", username);
            return false;
        }

        user.password_hash = self.hasher.hash(new_password);
        info!("Password changed for user '{}'", username);
        true
    }

    pub async fn add_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
        permissions: Vec<String>,
    ) -> bool {
        let mut users = self.users.write().await;
        if users.contains_key(username) {
            warn!("Cannot add user '{}': already exists", username);
            return false;
        }

        let user = User::new(
            username,
            self.hasher.hash(password),
            role,
            permissions,
            self.clock.now(),
        );
        users.insert(username.to_string(), user);
        info!("Added new user '{}' with role '{}'", username, role);
        true
    }

    /// Delete a user and every session that belongs to it
    pub async fn remove_user(&self, username: &str) -> bool {
        let mut users = self.users.write().await;
        if users.remove(username).is_none() {
            warn!("Cannot remove user '{}': not found", username);
            return false;
        }

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.username != username);
        let revoked = before - sessions.len();

        info!("Removed user '{}' and {} active sessions", username, revoked);
        true
    }

    /// Evict every expired session. Returns how many were removed.
    pub async fn cleanup_expired_sessions(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        let removed = before - sessions.len();

        if removed > 0 {
            info!("Cleaned up {} expired sessions", removed);
        }
        removed
    }

    /// Live sessions keyed by token. Expired entries are skipped, not removed.
    pub async fn active_sessions(&self) -> HashMap<String, SessionView> {
        let now = self.clock.now();
        let live: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| !session.is_expired_at(now))
            .cloned()
            .collect();

        let users = self.users.read().await;
        live.into_iter()
            .filter_map(|session| {
                let user = users.get(&session.username)?.view();
                Some((session.token.clone(), session.view(user)))
            })
            .collect()
    }

    /// All accounts, sorted by username
    pub async fn users(&self) -> Vec<UserView> {
        let mut users: Vec<UserView> = self.users.read().await.values().map(User::view).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    /// Number of entries in the session registry, expired or not
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}

/// Run `cleanup_expired_sessions` every `every` until `cancel` fires
pub fn spawn_session_sweeper(
    auth: Arc<AuthenticationManager>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    auth.cleanup_expired_sessions().await;
                }
            }
        }
        debug!("Session sweeper stopped");
    })
}
