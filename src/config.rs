//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the potbot-config.toml file.
//! It provides a centralized way to configure the backend address, session caching and
//! chart output.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "potbot-config.toml";

/// Application configuration loaded from potbot-config.toml
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Backend server configuration
    pub server: ServerConfig,
    /// Session cache configuration
    pub session: SessionConfig,
    /// Chart and time window configuration
    pub view: ViewConfig,
}

/// Backend server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Base URL of the potbot backend, without the `/api` suffix
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Session cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Where the logged-in user and session cookie are cached between runs
    pub cache_path: PathBuf,
    /// Cache TTL in minutes; matches the backend cookie max-age by default
    pub ttl_minutes: u64,
}

/// Chart and time window configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewConfig {
    /// Default log window, in days ending now
    pub window_days: i64,
    /// Pixel canvas width
    pub width: u32,
    /// Pixel canvas height
    pub height: u32,
    /// Rows per channel in ASCII charts
    pub ascii_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                base_url: "http://localhost:8080".to_string(),
                timeout_secs: 10,
            },
            session: SessionConfig {
                cache_path: PathBuf::from("/tmp/potbot_session.json"),
                ttl_minutes: 24 * 60,
            },
            view: ViewConfig {
                window_days: 7,
                width: 400,
                height: 300,
                ascii_rows: 16,
            },
        }
    }
}

impl Config {
    /// Load configuration from potbot-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(server = %config.server.base_url, "loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Save current configuration to the given path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    /// Saturates rather than overflowing for absurd `ttl_minutes`.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_minutes.saturating_mul(60))
    }
}
