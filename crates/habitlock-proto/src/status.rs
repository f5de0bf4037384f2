use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Daemon state as seen by the API/UI layer.
///
/// Serialized in camelCase because the consumer is the API layer's JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub is_running: bool,
    /// When the last evaluate-apply cycle finished
    #[serde(rename = "lastCheckTimestamp")]
    pub last_check: Option<DateTime<Utc>>,
    /// Domains present in the hosts file marked region right now
    pub currently_blocked_domains: BTreeSet<String>,
    pub should_block: bool,
    pub overdue_habits: Vec<String>,
    pub next_habit_start: Option<NaiveTime>,
    /// Error from the most recent failed cycle, cleared on success
    pub last_error: Option<String>,
}

impl DaemonStatus {
    pub fn starting() -> Self {
        Self { is_running: true, ..Default::default() }
    }

    pub fn read_from(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Write via a temp file and rename so readers never see a partial document.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp_path = path.with_extension(format!("json.tmp-{}", std::process::id()));
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)
    }
}
