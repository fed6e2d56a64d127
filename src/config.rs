//! Runtime configuration.
//!
//! Loaded from `<config_dir>/closet-quest/config.json`, then overridden by
//! environment variables:
//! - `CLOSET_QUEST_PORT` - HTTP port
//! - `CLOSET_QUEST_DB` - Database file path
//! - `CLOSET_QUEST_SAVE_TIMEOUT_MS` - Per-attempt save timeout
//! - `CLOSET_QUEST_SAVE_RETRIES` - Extra save attempts after a failure

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::media::{AudioSettings, DEFAULT_VOLUME};
use crate::persistence::PersistencePolicy;

const APP_NAME: &str = "closet-quest";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Port for the HTTP API.
    pub port: u16,
    /// Database file. `None` uses the platform data directory.
    pub database_path: Option<PathBuf>,
    pub save_timeout_ms: u64,
    pub save_retries: u32,
    /// Background music volume for every view (0.0 to 1.0).
    pub volume: f32,
    /// Whether views start with music muted.
    pub start_muted: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_path: None,
            save_timeout_ms: 5000,
            save_retries: 2,
            volume: DEFAULT_VOLUME,
            start_muted: false,
        }
    }
}

impl AppConfig {
    /// Load from disk and apply environment overrides.
    /// Falls back to defaults if the file is missing or fails to parse.
    pub fn load() -> Self {
        let config = match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    fn try_load() -> Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(&config_path)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup. Unparsable values are ignored.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = lookup("CLOSET_QUEST_PORT").and_then(|s| s.parse().ok()) {
            self.port = port;
        }
        if let Some(path) = lookup("CLOSET_QUEST_DB") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = lookup("CLOSET_QUEST_SAVE_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            self.save_timeout_ms = ms;
        }
        if let Some(retries) = lookup("CLOSET_QUEST_SAVE_RETRIES").and_then(|s| s.parse().ok()) {
            self.save_retries = retries;
        }
        self
    }

    pub fn persistence_policy(&self) -> PersistencePolicy {
        PersistencePolicy {
            timeout: Duration::from_millis(self.save_timeout_ms),
            retries: self.save_retries,
            ..PersistencePolicy::default()
        }
    }

    pub fn audio_settings(&self) -> AudioSettings {
        AudioSettings {
            volume: self.volume,
            start_muted: self.start_muted,
        }
    }
}

fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
