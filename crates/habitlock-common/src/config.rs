use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const APP_DIR: &str = "habitlock";
pub const SOCKET_FILE: &str = "habitlock.sock";
pub const STATUS_FILE: &str = "status.json";
pub const CONFIG_FILE: &str = "daemon.toml";
pub const CONFIG_ENV: &str = "HABITLOCK_CONFIG";

/// Where the daemon listens and publishes its status. Shared with clients so
/// both sides agree on the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
    pub status_path: PathBuf,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self { socket_path: default_socket_path(), status_path: default_status_path() }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

pub fn default_config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

/// The daemon configuration file, overridable through `HABITLOCK_CONFIG`
pub fn default_config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_config_dir().join(CONFIG_FILE))
}

pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir).join(SOCKET_FILE)
}

pub fn default_status_path() -> PathBuf {
    dirs::runtime_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(default_data_dir)
        .join(STATUS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipc_config_default() {
        let config = IpcConfig::default();
        assert!(config.socket_path.ends_with(SOCKET_FILE));
        assert!(config.status_path.ends_with(STATUS_FILE));
    }
}
