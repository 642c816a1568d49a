use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://eportfolio.db";

/// Application settings read from Rocket's figment, so they can come from
/// `Rocket.toml` or `ROCKET_*` environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub session_ttl_hours: i64,
    pub session_cleanup_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 1,
            session_cleanup_interval_secs: 3600,
        }
    }
}

pub fn database_url() -> String {
    dotenvy::var("DATABASE_URL").unwrap_or_else(|_| {
        info!("DATABASE_URL not set, using default: {}", DEFAULT_DATABASE_URL);
        DEFAULT_DATABASE_URL.to_string()
    })
}

fn env_files() -> Vec<&'static str> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    }
}

pub fn load_environment() -> Result<(), dotenvy::Error> {
    for env_file in env_files() {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), dotenvy::Error> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
