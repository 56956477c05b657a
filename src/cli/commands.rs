//! CLI command implementations

use anyhow::Result;
use std::fs;
use std::path::Path;

use crate::api;
use crate::auth::AuthenticationManager;
use crate::cli::{info, print_reading, print_user_table, success, warn, OutputFormat};
use crate::config::{self, loader::CONFIG_FILENAME, Config};
use crate::meter::{self, ReadMode};

/// Initialize a new powermeter.toml configuration file
pub async fn init() -> Result<()> {
    let config_path = Path::new(CONFIG_FILENAME);

    if config_path.exists() {
        warn(&format!("{} already exists", CONFIG_FILENAME));
        return Ok(());
    }

    fs::write(config_path, config::loader::default_config_content())?;

    success(&format!("Created {}", CONFIG_FILENAME));
    info("Edit the configuration file and run 'powermeter serve' to start the API");

    Ok(())
}

/// Start the HTTP API server
pub async fn serve(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    info(&format!(
        "Power monitor available at http://{}:{}/",
        config.server.host, config.server.port
    ));
    api::run_server(config)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}

/// List configured user accounts
pub async fn users(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let auth = AuthenticationManager::from_config(&config.auth);
    let users = auth.users().await;

    match format {
        OutputFormat::Table => print_user_table(&users),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&users)?),
    }

    Ok(())
}

/// Read the meter once
pub async fn check(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let client = meter::connect(&config.meter);
    let mode = ReadMode::from_detailed(config.meter.detailed);

    let reading = tokio::task::spawn_blocking(move || mode.read(client.as_ref())).await??;

    match format {
        OutputFormat::Table => {
            success("Meter answered");
            print_reading(&reading);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reading)?),
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    config::load_or_default(path).map_err(|e| anyhow::anyhow!("{}", e))
}
