use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use habitlock_common::config::IpcConfig;
use serde::Deserialize;

/// The part of the daemon's TOML file the CLI cares about.
#[derive(Debug, Default, Deserialize)]
struct DaemonFile {
    #[serde(default)]
    daemon: IpcConfig,
}

/// Socket and status paths as the daemon sees them. A missing file means the
/// daemon runs on defaults too.
pub fn load_ipc_config(path: &Path) -> Result<IpcConfig> {
    if !path.exists() {
        return Ok(IpcConfig::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read daemon config: {:?}", path))?;
    let file: DaemonFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse daemon config: {:?}", path))?;
    Ok(file.daemon)
}
