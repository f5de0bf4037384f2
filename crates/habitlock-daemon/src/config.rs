use anyhow::{Context, Result};
use habitlock_common::config::{
    default_config_path, default_data_dir, default_socket_path, default_status_path,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::DaemonError;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub hosts: HostsConfig,

    #[serde(default)]
    pub daemon: LoopConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_data_dir().join("habitlock.db").to_string_lossy().to_string() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostsConfig {
    /// The name-resolution file the marked region lives in
    pub path: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_retention_days: u32,
    /// argv prefix of the one privileged operation; the staged file and the
    /// target path are appended. Empty installs without elevation.
    pub install_command: Vec<String>,
    /// Command run after a successful mutation. Empty skips the flush.
    pub flush_command: Vec<String>,
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/hosts"),
            backup_dir: default_data_dir().join("backups"),
            backup_retention_days: 30,
            install_command: ["sudo", "-n", "/usr/bin/install", "-m", "644"]
                .into_iter()
                .map(String::from)
                .collect(),
            flush_command: ["resolvectl", "flush-caches"].into_iter().map(String::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoopConfig {
    pub socket_path: PathBuf,
    pub status_path: PathBuf,
    pub check_interval_secs: u64,
    pub connection_timeout_ms: u64,
    pub shutdown_timeout_secs: u64,
    pub log_level: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            status_path: default_status_path(),
            check_interval_secs: 30,
            connection_timeout_ms: 2000,
            shutdown_timeout_secs: 10,
            log_level: "info".to_string(),
        }
    }
}

impl LoopConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl DaemonConfig {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = default_config_path();
        let mut config = Self::load_from_path(&config_path)?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            debug!("DATABASE_URL overrides configured database path");
            config.database.path = url.trim_start_matches("sqlite://").to_string();
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        debug!("Loading daemon configuration from {:?}", config_path);

        if !config_path.exists() {
            info!(
                "Configuration file not found at {:?}, creating default configuration",
                config_path
            );
            let default_config = Self::default();
            default_config.save_to_path(config_path)?;
            return Ok(default_config);
        }

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: DaemonConfig = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        info!("Loaded daemon configuration from {:?}", config_path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        debug!("Saving daemon configuration to {:?}", config_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let config_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(config_path, config_content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        info!("Saved daemon configuration to {:?}", config_path);
        Ok(())
    }

    /// Check that every path the daemon needs is usable. Any failure here is fatal.
    pub fn validate(&self) -> std::result::Result<(), DaemonError> {
        let hosts = &self.hosts.path;
        fs::metadata(hosts)
            .and_then(|_| fs::read(hosts).map(|_| ()))
            .map_err(|e| {
                DaemonError::Config(format!("hosts file {} is not readable: {}", hosts.display(), e))
            })?;

        fs::create_dir_all(&self.hosts.backup_dir).map_err(|e| {
            DaemonError::Config(format!(
                "cannot create backup directory {}: {}",
                self.hosts.backup_dir.display(),
                e
            ))
        })?;

        for path in [&self.daemon.socket_path, &self.daemon.status_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    DaemonError::Config(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        if let Some(program) = self.hosts.install_command.first() {
            if program.trim().is_empty() {
                return Err(DaemonError::Config("install_command has an empty program".to_string()));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.hosts.path, PathBuf::from("/etc/hosts"));
        assert_eq!(config.hosts.backup_retention_days, 30);
        assert_eq!(config.daemon.check_interval(), Duration::from_secs(30));
        assert_eq!(config.hosts.install_command[0], "sudo");
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("daemon.toml");

        let config = DaemonConfig::load_from_path(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.daemon.shutdown_timeout_secs, 10);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.toml");
        fs::write(
            &path,
            r#"
            [hosts]
            path = "/tmp/hosts-test"
            install_command = []

            [daemon]
            check_interval_secs = 5
            "#,
        )
        .unwrap();

        let config = DaemonConfig::load_from_path(&path).unwrap();
        assert_eq!(config.hosts.path, PathBuf::from("/tmp/hosts-test"));
        assert!(config.hosts.install_command.is_empty());
        assert_eq!(config.hosts.backup_retention_days, 30);
        assert_eq!(config.daemon.check_interval(), Duration::from_secs(5));
        assert_eq!(config.daemon.connection_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn test_validate_rejects_missing_hosts_file() {
        let dir = tempdir().unwrap();
        let mut config = DaemonConfig::default();
        config.hosts.path = dir.path().join("no-hosts");
        config.hosts.backup_dir = dir.path().join("backups");
        config.daemon.socket_path = dir.path().join("run").join("habitlock.sock");
        config.daemon.status_path = dir.path().join("run").join("status.json");

        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));

        fs::write(&config.hosts.path, "127.0.0.1 localhost\n").unwrap();
        config.validate().unwrap();
        assert!(config.hosts.backup_dir.is_dir());
    }
}
