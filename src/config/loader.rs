//! Configuration loading and environment variable interpolation

use crate::error::{Error, Result};
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::Config;

pub const CONFIG_FILENAME: &str = "powermeter.toml";

/// Load configuration from powermeter.toml
pub fn load_config() -> Result<Config> {
    let config_path = find_config_file()?;
    load_config_from_path(&config_path)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|_| Error::ConfigNotFound)?;
    let content = interpolate_env_vars(&content);
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load from an explicit path, or search for one, or fall back to defaults
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config_from_path(path),
        None => match load_config() {
            Ok(config) => Ok(config),
            Err(Error::ConfigNotFound) => {
                tracing::warn!("No {} found, using built-in defaults", CONFIG_FILENAME);
                Ok(Config::default())
            }
            Err(e) => Err(e),
        },
    }
}

/// Find the configuration file, searching upward from current directory
fn find_config_file() -> Result<PathBuf> {
    let mut current = env::current_dir().map_err(|e| Error::Config(e.to_string()))?;

    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(Error::ConfigNotFound);
        }
    }
}

/// Interpolate environment variables in the format ${VAR_NAME} or ${VAR_NAME:-default}
fn interpolate_env_vars(content: &str) -> String {
    // Compile-time constant pattern; a failure here is a bug, not bad input
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("Invalid regex pattern - this is a bug in the codebase");

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Generate a default configuration file content
pub fn default_config_content() -> &'static str {
    r#"# Powermeter Configuration

[server]
host = "0.0.0.0"
port = 8080
web_dir = "./web"

[auth]
# Shared secret mixed into every password hash
salt = "${POWERMETER_SALT:-powermeter_salt_2024}"
session_ttl_hours = 8
cleanup_interval_secs = 300

# Without any [[auth.users]] entries the defaults are seeded:
#   admin/admin, operator/operator, viewer/viewer
# [[auth.users]]
# username = "admin"
# password = "${POWERMETER_ADMIN_PASSWORD:-admin}"
# role = "admin"
# permissions = ["read", "write", "admin", "config", "modbus"]

[meter]
device_address = 1
poll_interval_secs = 2
detailed = false
verify_on_start = true
"#
}
