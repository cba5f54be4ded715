//! Application configuration management.
//!
//! The backend base URL comes from the `BACKEND_URL` environment variable
//! (a `.env` file is honored), read once at startup. The credential storage
//! directory defaults to the platform config directory and can be overridden
//! with `SESSIONKIT_STORAGE_DIR`.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application name used for the default storage directory path
const APP_NAME: &str = "sessionkit";

/// Environment variable holding the backend base URL
const BASE_URL_ENV: &str = "BACKEND_URL";

/// Optional override for the credential storage directory
const STORAGE_DIR_ENV: &str = "SESSIONKIT_STORAGE_DIR";

#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL, normalized to carry no trailing slash
    pub base_url: String,
    /// Directory holding the persisted credential
    pub storage_dir: PathBuf,
}

impl Config {
    /// Build a config explicitly. Embedders and tests use this directly;
    /// deployments go through [`Config::from_env`].
    pub fn new(base_url: impl Into<String>, storage_dir: impl Into<PathBuf>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Self {
            base_url,
            storage_dir: storage_dir.into(),
        }
    }

    /// Read the deploy-time configuration from the environment. Call once at
    /// process startup.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let base_url = std::env::var(BASE_URL_ENV)
            .with_context(|| format!("{} must be set to the backend base URL", BASE_URL_ENV))?;

        let storage_dir = match std::env::var_os(STORAGE_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
                .join(APP_NAME),
        };

        Ok(Self::new(base_url, storage_dir))
    }
}
