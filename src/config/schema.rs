//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::Permission;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub meter: MeterConfig,
}

/// Server configuration for the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the browser UI, served for any non-API path
    #[serde(default = "default_web_dir")]
    pub web_dir: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_web_dir() -> PathBuf {
    PathBuf::from("./web")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            web_dir: default_web_dir(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret appended to every password before hashing.
    ///
    /// One salt for all accounts is a weak construction; see DESIGN.md.
    #[serde(default = "default_salt")]
    pub salt: String,

    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Accounts seeded at startup. Empty means the built-in defaults.
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_salt() -> String {
    "powermeter_salt_2024".to_string()
}

fn default_session_ttl_hours() -> u64 {
    8
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            salt: default_salt(),
            session_ttl_hours: default_session_ttl_hours(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            users: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours as i64)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    /// Configured accounts, falling back to the built-in admin/operator/viewer set
    pub fn seed_users(&self) -> Vec<UserConfig> {
        if self.users.is_empty() {
            UserConfig::defaults()
        } else {
            self.users.clone()
        }
    }
}

/// A user account as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl UserConfig {
    fn new(username: &str, role: &str, permissions: &[&str]) -> Self {
        Self {
            username: username.to_string(),
            password: username.to_string(),
            role: role.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn defaults() -> Vec<UserConfig> {
        vec![
            UserConfig::new(
                "admin",
                "admin",
                &[
                    Permission::READ,
                    Permission::WRITE,
                    Permission::ADMIN,
                    Permission::CONFIG,
                    Permission::MODBUS,
                ],
            ),
            UserConfig::new(
                "operator",
                "operator",
                &[Permission::READ, Permission::WRITE, Permission::MODBUS],
            ),
            UserConfig::new("viewer", "viewer", &[Permission::READ]),
        ]
    }
}

/// Meter polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Device address on the bus
    #[serde(default = "default_device_address")]
    pub device_address: u8,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Poll detailed (per-phase) readings instead of the basic set
    #[serde(default)]
    pub detailed: bool,

    /// Refuse to start the server when the meter does not answer
    #[serde(default = "default_verify_on_start")]
    pub verify_on_start: bool,
}

fn default_device_address() -> u8 {
    1
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_verify_on_start() -> bool {
    true
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            device_address: default_device_address(),
            poll_interval_secs: default_poll_interval_secs(),
            detailed: false,
            verify_on_start: default_verify_on_start(),
        }
    }
}

impl MeterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Config {
    /// Reject values the server cannot run with
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.meter.poll_interval_secs == 0 {
            return Err(crate::error::Error::Config(
                "meter.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.auth.session_ttl_hours == 0 {
            return Err(crate::error::Error::Config(
                "auth.session_ttl_hours must be greater than zero".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for user in &self.auth.users {
            if user.username.trim().is_empty() {
                return Err(crate::error::Error::Config(
                    "auth.users entries need a username".to_string(),
                ));
            }
            if !seen.insert(user.username.as_str()) {
                return Err(crate::error::Error::Config(format!(
                    "duplicate username '{}' in auth.users",
                    user.username
                )));
            }
        }
        Ok(())
    }
}
