// Hosts file ownership: only the marked region is ever changed, every write is
// preceded by a backup, and an identical result is never written at all.

pub mod backup;
pub mod install;
pub mod region;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use habitlock_common::domain::validate_domain;
use habitlock_common::schedule::describe_domains;
use tracing::{debug, info, warn};

use crate::config::HostsConfig;
use crate::error::HostsError;

pub use backup::BackupStore;
pub use install::Installer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostsChange {
    /// The file already had the desired content
    Unchanged,
    Written,
}

pub struct HostsFileManager {
    hosts_path: PathBuf,
    backups: BackupStore,
    installer: Installer,
    flush_command: Vec<String>,
    /// Domains the region held after the last successful convergence;
    /// `None` when the file carries no region.
    last_applied: Option<BTreeSet<String>>,
}

impl HostsFileManager {
    pub fn new(config: &HostsConfig) -> Self {
        Self {
            hosts_path: config.path.clone(),
            backups: BackupStore::new(&config.backup_dir, config.backup_retention_days),
            installer: Installer::from_argv(&config.install_command),
            flush_command: config.flush_command.clone(),
            last_applied: None,
        }
    }

    pub fn hosts_path(&self) -> &Path {
        &self.hosts_path
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn last_applied(&self) -> Option<&BTreeSet<String>> {
        self.last_applied.as_ref()
    }

    /// Adopt whatever region a previous run left behind.
    pub fn recover(&mut self) -> Result<Option<BTreeSet<String>>, HostsError> {
        let content = self.read_current()?;
        let recovered = region::region_domains(&content).map_err(|e| self.malformed(e))?;

        match &recovered {
            Some(domains) => info!(
                "Found existing blocking region in {} for [{}]",
                self.hosts_path.display(),
                describe_domains(domains)
            ),
            None => debug!("No blocking region present in {}", self.hosts_path.display()),
        }

        self.last_applied = recovered.clone();
        Ok(recovered)
    }

    /// Make the region map exactly `domains`. Invalid entries are skipped.
    pub async fn apply_blocking(&mut self, domains: &BTreeSet<String>) -> Result<HostsChange, HostsError> {
        let desired = sanitize(domains);
        let content = self.read_current()?;
        let updated = region::with_region(&content, &desired).map_err(|e| self.malformed(e))?;

        let change = self.converge(&content, updated).await?;
        if change == HostsChange::Written {
            info!("Blocking [{}]", describe_domains(&desired));
        }
        self.last_applied = Some(desired);
        Ok(change)
    }

    /// Drop the region. A file without one is left alone.
    pub async fn remove_blocking(&mut self) -> Result<HostsChange, HostsError> {
        let content = self.read_current()?;
        let updated = region::without_region(&content).map_err(|e| self.malformed(e))?;

        let change = self.converge(&content, updated).await?;
        if change == HostsChange::Written {
            info!("Removed blocking region from {}", self.hosts_path.display());
        }
        self.last_applied = None;
        Ok(change)
    }

    /// Unconditional removal requested by an operator, regardless of what
    /// this process believes it last applied.
    pub async fn reset(&mut self) -> Result<HostsChange, HostsError> {
        warn!("Reset requested, removing blocking region from {}", self.hosts_path.display());
        self.remove_blocking().await
    }

    fn read_current(&self) -> Result<String, HostsError> {
        let bytes = fs::read(&self.hosts_path).map_err(|e| HostsError::io(&self.hosts_path, e))?;
        String::from_utf8(bytes).map_err(|e| {
            HostsError::io(&self.hosts_path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    fn malformed(&self, err: region::RegionError) -> HostsError {
        HostsError::MalformedRegion { path: self.hosts_path.clone(), reason: err.0 }
    }

    async fn converge(&self, current: &str, updated: String) -> Result<HostsChange, HostsError> {
        if updated == current {
            debug!("{} already up to date", self.hosts_path.display());
            return Ok(HostsChange::Unchanged);
        }

        // A retried mutation whose install failed was already backed up
        let now = Utc::now();
        if self.backups.latest_matches(current.as_bytes())? {
            debug!("Newest backup already holds the current {}", self.hosts_path.display());
        } else {
            self.backups.snapshot(current.as_bytes(), now)?;
        }
        if let Err(e) = self.backups.prune(now) {
            warn!("Failed to prune hosts backups: {}", e);
        }

        let staged = self.installer.stage(updated.as_bytes(), &self.hosts_path, self.backups.dir())?;
        self.installer.install(staged, &self.hosts_path).await?;

        install::flush_dns(&self.flush_command).await;
        Ok(HostsChange::Written)
    }
}

fn sanitize(domains: &BTreeSet<String>) -> BTreeSet<String> {
    domains
        .iter()
        .filter_map(|domain| match validate_domain(domain) {
            Ok(valid) => Some(valid),
            Err(e) => {
                warn!("Skipping blocked website {:?}: {}", domain, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    const SYSTEM_HOSTS: &str = "127.0.0.1 localhost\n::1 localhost\n# keep me\n10.1.2.3 printer.lan\n";

    fn setup(initial: &str) -> (TempDir, HostsFileManager) {
        let dir = tempdir().unwrap();
        let hosts = dir.path().join("hosts");
        fs::write(&hosts, initial).unwrap();

        let config = HostsConfig {
            path: hosts,
            backup_dir: dir.path().join("backups"),
            backup_retention_days: 30,
            install_command: Vec::new(),
            flush_command: Vec::new(),
        };
        let manager = HostsFileManager::new(&config);
        (dir, manager)
    }

    fn domains(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    fn read(manager: &HostsFileManager) -> String {
        fs::read_to_string(manager.hosts_path()).unwrap()
    }

    fn backup_count(manager: &HostsFileManager) -> usize {
        manager.backups().list().unwrap().len()
    }

    #[tokio::test]
    async fn test_apply_then_remove_restores_file() {
        let (_dir, mut manager) = setup(SYSTEM_HOSTS);

        let change = manager.apply_blocking(&domains(&["reddit.com", "x.com"])).await.unwrap();
        assert_eq!(change, HostsChange::Written);

        let blocked = read(&manager);
        assert!(blocked.starts_with(SYSTEM_HOSTS));
        for line in ["127.0.0.1 reddit.com", "127.0.0.1 www.reddit.com", "127.0.0.1 x.com", "127.0.0.1 www.x.com"] {
            assert!(blocked.lines().any(|l| l == line), "missing {}", line);
        }
        assert_eq!(manager.last_applied(), Some(&domains(&["reddit.com", "x.com"])));

        assert_eq!(manager.remove_blocking().await.unwrap(), HostsChange::Written);
        assert_eq!(read(&manager), SYSTEM_HOSTS);
        assert_eq!(manager.last_applied(), None);
        assert_eq!(backup_count(&manager), 2);
    }

    #[tokio::test]
    async fn test_round_trip_without_trailing_newline() {
        let (_dir, mut manager) = setup("127.0.0.1 localhost");

        manager.apply_blocking(&domains(&["reddit.com"])).await.unwrap();
        assert_eq!(manager.apply_blocking(&domains(&["reddit.com"])).await.unwrap(), HostsChange::Unchanged);
        manager.remove_blocking().await.unwrap();

        assert_eq!(read(&manager), "127.0.0.1 localhost");
    }

    #[tokio::test]
    async fn test_repeat_apply_is_a_noop() {
        let (_dir, mut manager) = setup(SYSTEM_HOSTS);
        let set = domains(&["reddit.com"]);

        manager.apply_blocking(&set).await.unwrap();
        let after_first = read(&manager);
        let backups = backup_count(&manager);

        assert_eq!(manager.apply_blocking(&set).await.unwrap(), HostsChange::Unchanged);
        assert_eq!(read(&manager), after_first);
        assert_eq!(backup_count(&manager), backups);
    }

    #[tokio::test]
    async fn test_remove_without_region_is_a_noop() {
        let (_dir, mut manager) = setup(SYSTEM_HOSTS);

        assert_eq!(manager.remove_blocking().await.unwrap(), HostsChange::Unchanged);
        assert_eq!(manager.reset().await.unwrap(), HostsChange::Unchanged);
        assert_eq!(read(&manager), SYSTEM_HOSTS);
        assert_eq!(backup_count(&manager), 0);
    }

    #[tokio::test]
    async fn test_set_change_replaces_region_in_place() {
        let (_dir, mut manager) = setup(SYSTEM_HOSTS);

        manager.apply_blocking(&domains(&["reddit.com"])).await.unwrap();
        manager.apply_blocking(&domains(&["x.com"])).await.unwrap();

        let content = read(&manager);
        assert!(!content.contains("reddit.com"));
        assert!(content.contains("127.0.0.1 www.x.com"));
        assert_eq!(content.matches(region::BEGIN_MARKER).count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_domains_are_skipped() {
        let (_dir, mut manager) = setup(SYSTEM_HOSTS);

        manager
            .apply_blocking(&domains(&["reddit.com", "bad domain\n1.2.3.4 evil", "WWW.News.Example."]))
            .await
            .unwrap();

        assert_eq!(manager.last_applied(), Some(&domains(&["news.example", "reddit.com"])));
        assert!(!read(&manager).contains("evil"));
    }

    #[tokio::test]
    async fn test_malformed_region_is_left_untouched() {
        let broken = format!("{}{}\n127.0.0.1 reddit.com\n", SYSTEM_HOSTS, region::BEGIN_MARKER);
        let (_dir, mut manager) = setup(&broken);

        let err = manager.apply_blocking(&domains(&["x.com"])).await.unwrap_err();
        assert!(matches!(err, HostsError::MalformedRegion { .. }));
        assert!(matches!(manager.remove_blocking().await, Err(HostsError::MalformedRegion { .. })));
        assert!(manager.recover().is_err());

        assert_eq!(read(&manager), broken);
        assert_eq!(backup_count(&manager), 0);
    }

    #[tokio::test]
    async fn test_failed_install_keeps_original() {
        let dir = tempdir().unwrap();
        let hosts = dir.path().join("hosts");
        fs::write(&hosts, SYSTEM_HOSTS).unwrap();
        let config = HostsConfig {
            path: hosts.clone(),
            backup_dir: dir.path().join("backups"),
            backup_retention_days: 30,
            install_command: vec!["false".to_string()],
            flush_command: Vec::new(),
        };
        let mut manager = HostsFileManager::new(&config);

        let err = manager.apply_blocking(&domains(&["reddit.com"])).await.unwrap_err();
        assert!(matches!(err, HostsError::InstallFailed { .. }));
        assert_eq!(fs::read_to_string(&hosts).unwrap(), SYSTEM_HOSTS);
        assert_eq!(manager.last_applied(), None);
    }

    #[tokio::test]
    async fn test_retried_failing_install_backs_up_once() {
        let dir = tempdir().unwrap();
        let hosts = dir.path().join("hosts");
        fs::write(&hosts, SYSTEM_HOSTS).unwrap();
        let config = HostsConfig {
            path: hosts.clone(),
            backup_dir: dir.path().join("backups"),
            backup_retention_days: 30,
            install_command: vec!["false".to_string()],
            flush_command: Vec::new(),
        };
        let mut manager = HostsFileManager::new(&config);

        for _ in 0..5 {
            assert!(manager.apply_blocking(&domains(&["reddit.com"])).await.is_err());
        }

        let backups = manager.backups().list().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0].1).unwrap(), SYSTEM_HOSTS);
        assert_eq!(fs::read_to_string(&hosts).unwrap(), SYSTEM_HOSTS);
    }

    #[tokio::test]
    async fn test_recover_adopts_existing_region() {
        let (_dir, mut manager) = setup(SYSTEM_HOSTS);
        manager.apply_blocking(&domains(&["reddit.com"])).await.unwrap();

        let config = HostsConfig {
            path: manager.hosts_path().to_path_buf(),
            backup_dir: manager.backups().dir().to_path_buf(),
            backup_retention_days: 30,
            install_command: Vec::new(),
            flush_command: Vec::new(),
        };
        let mut restarted = HostsFileManager::new(&config);
        assert_eq!(restarted.last_applied(), None);
        assert_eq!(restarted.recover().unwrap(), Some(domains(&["reddit.com"])));
        assert_eq!(restarted.last_applied(), Some(&domains(&["reddit.com"])));
    }

    #[tokio::test]
    async fn test_backup_holds_previous_content() {
        let (_dir, mut manager) = setup(SYSTEM_HOSTS);
        manager.apply_blocking(&domains(&["reddit.com"])).await.unwrap();

        let backups = manager.backups().list().unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read_to_string(&backups[0].1).unwrap(), SYSTEM_HOSTS);
    }
}
