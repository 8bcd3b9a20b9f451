//! Warden configuration - JSON file under the user config directory

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Warden configuration, loaded from `~/.config/server-warden/config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WardenConfig {
    /// OS service name the game server is registered under
    pub service_name: String,
    /// Live save-data directory to back up
    pub source_path: PathBuf,
    /// Root directory backups are written to
    pub backup_root: PathBuf,
    /// Maximum number of retained backup artifacts (0 = keep nothing)
    pub max_backups: usize,
    /// Compress backups into a zip archive (false = plain directory copy)
    pub compress_backups: bool,
    /// Log staleness window in minutes for the health check
    pub staleness_minutes: u64,
    /// Cooldown between forced stop and restart, in seconds
    pub repair_cooldown_secs: u64,
    /// Lookback window for stop classification, in minutes
    pub stop_lookback_minutes: u64,
    /// Process name of the supervisor wrapper, if the service runs one
    pub wrapper_process: Option<String>,
    /// Regex matched against candidate workload process names
    pub workload_pattern: String,
    /// File name of the actively-written primary log inside `source_path`
    pub log_file_name: String,
    /// Health-check poll interval for the watch loop, in seconds
    pub poll_interval_secs: u64,
    /// How long to wait for the service to come up after a restart, in seconds
    pub startup_timeout_secs: u64,
    /// Scheduled backup interval for the watch loop, in minutes
    pub backup_interval_minutes: u64,
    /// Optional `host:port` probed to confirm the embedded database answers
    pub database_probe_addr: Option<String>,
    /// Optional webhook URL for backup notifications
    pub webhook_url: Option<String>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            service_name: "game-server".to_string(),
            source_path: PathBuf::from("/var/lib/game-server/save"),
            backup_root: PathBuf::from("/var/backups/game-server"),
            max_backups: 10,
            compress_backups: true,
            staleness_minutes: 15,
            repair_cooldown_secs: 5,
            stop_lookback_minutes: 10,
            wrapper_process: None,
            workload_pattern: "(?i)server".to_string(),
            log_file_name: "server.log".to_string(),
            poll_interval_secs: 60,
            startup_timeout_secs: 120,
            backup_interval_minutes: 360,
            database_probe_addr: None,
            webhook_url: None,
        }
    }
}

impl WardenConfig {
    /// Load configuration from the default location, falling back to defaults
    /// when no config file exists yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        Ok(config)
    }

    /// Write the configuration back out, creating the directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Path of the primary server log inside the save directory.
    pub fn primary_log_path(&self) -> PathBuf {
        self.source_path.join(&self.log_file_name)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/server-warden")
}

/// Default config file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = WardenConfig::load_from(&dir.path().join("missing.json")).unwrap();
        assert_eq!(config.max_backups, 10);
        assert_eq!(config.staleness_minutes, 15);
        assert_eq!(config.repair_cooldown_secs, 5);
        assert!(config.compress_backups);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = WardenConfig::default();
        config.service_name = "valheim".to_string();
        config.max_backups = 4;
        config.save_to(&path).unwrap();

        let loaded = WardenConfig::load_from(&path).unwrap();
        assert_eq!(loaded.service_name, "valheim");
        assert_eq!(loaded.max_backups, 4);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"serviceName": "rust-server"}"#).unwrap();

        let config = WardenConfig::load_from(&path).unwrap();
        assert_eq!(config.service_name, "rust-server");
        assert_eq!(config.max_backups, 10);
    }
}
