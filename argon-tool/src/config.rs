use std::path::PathBuf;

use argon_core::{GeoPoint, ModelTable, RefreshPolicy, SessionConfig};
use serde::Deserialize;
use tracing::warn;

use crate::error::ArgError;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub base_url: Option<String>,
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,
    #[serde(default)]
    pub models: ModelTable,
    #[serde(default)]
    pub location: LocationConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct LocationConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Look the location up from the public IP address at startup.
    #[serde(default)]
    pub geolocate: bool,
}

impl LocationConfig {
    pub fn fixed(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

impl Config {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            models: self.models.clone(),
            refresh_policy: self.refresh_policy,
        }
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("argon").join("config.toml"))
}

pub fn parse_config(content: &str) -> Result<Config, ArgError> {
    Ok(toml::from_str(content)?)
}

pub fn load_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };

    let Ok(content) = std::fs::read_to_string(&path) else {
        return Config::default();
    };

    parse_config(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Ignoring unreadable config");
        Config::default()
    })
}

/// Resolves the API key, re-reading the environment and config file each time.
pub fn load_api_key() -> Result<String, ArgError> {
    // First, try environment variables
    for var in ["GEMINI_API_KEY", "API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                return Ok(key);
            }
        }
    }

    // Then, try config file
    let config = load_config();
    if let Some(key) = config.gemini_api_key {
        if !key.is_empty() {
            return Ok(key);
        }
    }

    Err(ArgError::ApiKeyNotFound)
}
