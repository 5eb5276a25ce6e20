use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Main configuration for the LWL launcher
///
/// Missing fields fall back to their defaults. The capitalized keys written by
/// early launcher versions are accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one record file per game (default: ~/.config/lwl/libary/)
    #[serde(alias = "Game_libary_location", alias = "game_libary_location")]
    pub game_library_location: PathBuf,

    /// Application directory (default: ~/.config/lwl/)
    #[serde(alias = "App_location")]
    pub app_location: PathBuf,

    /// Log directory (default: ~/.config/lwl/logs/)
    #[serde(alias = "Logs_location")]
    pub logs_location: PathBuf,

    /// Liveness probe interval for running games in milliseconds (default: 500)
    pub poll_interval_ms: u64,
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Loaded,
    Created,
}

impl Default for Config {
    fn default() -> Self {
        let app_location = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("lwl");

        Self::with_app_location(app_location)
    }
}

impl Config {
    /// Default layout rooted at `app_location`
    pub fn with_app_location(app_location: impl Into<PathBuf>) -> Self {
        let app_location = app_location.into();

        Self {
            game_library_location: app_location.join("libary"),
            logs_location: app_location.join("logs"),
            app_location,
            poll_interval_ms: 500,
        }
    }

    /// Default configuration file path (~/.config/lwl/config.toml)
    pub fn default_path() -> PathBuf {
        Self::default().app_location.join(CONFIG_FILE_NAME)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {:?}", path))?;
        Ok(config)
    }

    /// Save configuration to TOML file, creating its directory if needed
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file {:?}", path))?;
        Ok(())
    }

    /// Load the configuration at `path`, writing the defaults there first if
    /// the file does not exist yet
    pub fn load_or_create(path: &Path) -> Result<(Self, ConfigSource)> {
        if path.exists() {
            return Ok((Self::load_from_file(path)?, ConfigSource::Loaded));
        }

        let config = Self::default();
        config.save_to_file(path)?;
        Ok((config, ConfigSource::Created))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.game_library_location.as_os_str().is_empty() {
            return Err("Game library location must not be empty".to_string());
        }

        if self.app_location.as_os_str().is_empty() {
            return Err("App location must not be empty".to_string());
        }

        if self.logs_location.as_os_str().is_empty() {
            return Err("Logs location must not be empty".to_string());
        }

        if self.poll_interval_ms == 0 {
            return Err("Poll interval must be > 0".to_string());
        }

        Ok(())
    }

    /// Create the library and log directories
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.game_library_location, &self.logs_location] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {:?}", dir))?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
