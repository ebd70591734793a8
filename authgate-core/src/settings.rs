//! Settings persistence module
//!
//! Saves and loads client settings to/from disk

use crate::auth::AuthError;
use crate::navigation::LOGIN_ROUTE;
use crate::utils::{authgate_data_dir, APP_NAME};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use url::Url;

const SETTINGS_FILE: &str = "settings.json";

/// Environment variable that overrides `api_base_url`
pub const API_URL_ENV: &str = "AUTHGATE_API_URL";

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Base URL of the auth service
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Route to navigate to when a session ends
    #[serde(default = "default_login_route")]
    pub login_route: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Attempts per request for transport failures (1 = no retry)
    #[serde(default = "default_retry_attempts")]
    pub network_retry_attempts: u32,
    /// Whether the cookie tier accepts writes
    #[serde(default = "default_true")]
    pub cookies_enabled: bool,
    /// Keep session stores on disk (false = in memory only)
    #[serde(default = "default_true")]
    pub persist: bool,
    /// Override for the session store directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_login_route() -> String {
    LOGIN_ROUTE.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("AuthGate/{}", env!("CARGO_PKG_VERSION"))
}

fn default_retry_attempts() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            login_route: default_login_route(),
            request_timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            network_retry_attempts: default_retry_attempts(),
            cookies_enabled: true,
            persist: true,
            data_dir: None,
        }
    }
}

impl AuthSettings {
    /// Parsed base URL
    pub fn base_url(&self) -> Result<Url, AuthError> {
        Url::parse(&self.api_base_url).map_err(|e| {
            AuthError::ValidationError(format!("Invalid API base URL {}: {}", self.api_base_url, e))
        })
    }

    /// Directory holding the cookie jar and local storage files
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(authgate_data_dir)
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                info!("Using API URL from {}", API_URL_ENV);
                self.api_base_url = url.trim().to_string();
            }
        }
        self
    }
}

/// Get the settings directory path
fn get_settings_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME))
}

/// Get the full path to the settings file
pub fn get_settings_path() -> Option<PathBuf> {
    get_settings_dir().map(|p| p.join(SETTINGS_FILE))
}

/// Load settings from the default location, then apply environment overrides
pub fn load_settings() -> AuthSettings {
    let settings = match get_settings_path() {
        Some(path) => load_settings_from(&path),
        None => {
            debug!("Could not determine settings path, using defaults");
            AuthSettings::default()
        }
    };
    settings.with_env_overrides()
}

/// Load settings from `path`, falling back to defaults
pub fn load_settings_from(path: &std::path::Path) -> AuthSettings {
    if !path.exists() {
        debug!("Settings file does not exist, using defaults");
        return AuthSettings::default();
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(settings) => {
                info!("Loaded settings from {:?}", path);
                settings
            }
            Err(e) => {
                error!("Failed to parse settings file: {}", e);
                AuthSettings::default()
            }
        },
        Err(e) => {
            error!("Failed to read settings file: {}", e);
            AuthSettings::default()
        }
    }
}

/// Save settings to `path`
pub fn save_settings_to(settings: &AuthSettings, path: &std::path::Path) -> Result<(), AuthError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| {
            AuthError::StorageError(format!("Failed to create settings directory: {}", e))
        })?;
    }

    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| AuthError::StorageError(format!("Failed to serialize settings: {}", e)))?;

    fs::write(path, json)
        .map_err(|e| AuthError::StorageError(format!("Failed to write settings file: {}", e)))?;

    info!("Saved settings to {:?}", path);
    Ok(())
}

/// Save settings to the default location
pub fn save_settings(settings: &AuthSettings) -> Result<(), AuthError> {
    let path = get_settings_path().ok_or_else(|| {
        AuthError::StorageError("Could not determine settings directory".to_string())
    })?;
    save_settings_to(settings, &path)
}
