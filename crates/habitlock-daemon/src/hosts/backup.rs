use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::error::HostsError;

const BACKUP_PREFIX: &str = "hosts-";
const BACKUP_SUFFIX: &str = ".bak";
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Timestamped copies of the hosts file taken before each mutation.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    retention: Duration,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self { dir: dir.into(), retention: Duration::days(i64::from(retention_days)) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(at: DateTime<Utc>) -> String {
        format!("{}{}{}", BACKUP_PREFIX, at.format(STAMP_FORMAT), BACKUP_SUFFIX)
    }

    pub fn parse_file_name(name: &str) -> Option<DateTime<Utc>> {
        let stamp = name.strip_prefix(BACKUP_PREFIX)?;
        // Collision suffixes look like `...Z-1.bak`
        let stamp = stamp.strip_suffix(BACKUP_SUFFIX)?;
        let stamp = match stamp.rfind('Z') {
            Some(idx) => &stamp[..=idx],
            None => stamp,
        };
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok().map(|naive| naive.and_utc())
    }

    /// Write `content` to a new backup file and return its path.
    pub fn snapshot(&self, content: &[u8], at: DateTime<Utc>) -> Result<PathBuf, HostsError> {
        fs::create_dir_all(&self.dir).map_err(|e| HostsError::io(&self.dir, e))?;

        let base = Self::file_name(at);
        let mut path = self.dir.join(&base);
        let mut attempt = 0;
        while path.exists() {
            attempt += 1;
            let stem = base.trim_end_matches(BACKUP_SUFFIX);
            path = self.dir.join(format!("{}-{}{}", stem, attempt, BACKUP_SUFFIX));
        }

        fs::write(&path, content).map_err(|e| HostsError::io(&path, e))?;
        debug!("Backed up hosts file to {}", path.display());
        Ok(path)
    }

    /// Whether the newest backup already holds exactly `content`.
    pub fn latest_matches(&self, content: &[u8]) -> Result<bool, HostsError> {
        let Some((_, path)) = self.list()?.pop() else {
            return Ok(false);
        };
        let latest = fs::read(&path).map_err(|e| HostsError::io(&path, e))?;
        Ok(latest == content)
    }

    /// Backups on disk, oldest first. Files that don't follow the naming scheme are ignored.
    pub fn list(&self) -> Result<Vec<(DateTime<Utc>, PathBuf)>, HostsError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HostsError::io(&self.dir, e)),
        };

        let mut backups: Vec<(DateTime<Utc>, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let taken_at = Self::parse_file_name(name.to_str()?)?;
                Some((taken_at, entry.path()))
            })
            .collect();

        backups.sort();
        Ok(backups)
    }

    /// Delete backups older than the retention window. Returns how many went.
    pub fn prune(&self, now: DateTime<Utc>) -> Result<usize, HostsError> {
        let cutoff = now - self.retention;
        let mut removed = 0;

        for (taken_at, path) in self.list()? {
            if taken_at >= cutoff {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove old backup {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            debug!("Pruned {} hosts backups older than {}", removed, cutoff);
        }
        Ok(removed)
    }
}
