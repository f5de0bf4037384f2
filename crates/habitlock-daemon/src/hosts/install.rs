use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::HostsError;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// How a staged hosts file replaces the real one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Installer {
    /// Rename into place. Needs write access to the target's directory.
    Direct,
    /// Run an external program with the staged path and the target appended.
    Command(Vec<String>),
}

impl Installer {
    pub fn from_argv(argv: &[String]) -> Self {
        if argv.is_empty() {
            Installer::Direct
        } else {
            Installer::Command(argv.to_vec())
        }
    }

    /// Write `content` into a private temporary file ready for `install`.
    /// Direct installs stage next to the target so the final rename stays on
    /// one filesystem.
    pub fn stage(
        &self,
        content: &[u8],
        target: &Path,
        scratch_dir: &Path,
    ) -> Result<NamedTempFile, HostsError> {
        let dir = match self {
            Installer::Direct => {
                target.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."))
            }
            Installer::Command(_) => scratch_dir,
        };
        fs::create_dir_all(dir).map_err(|e| HostsError::io(dir, e))?;

        let mut staged = tempfile::Builder::new()
            .prefix(".habitlock-hosts-")
            .tempfile_in(dir)
            .map_err(|e| HostsError::io(dir, e))?;
        staged.write_all(content).map_err(|e| HostsError::io(staged.path(), e))?;
        staged.as_file().sync_all().map_err(|e| HostsError::io(staged.path(), e))?;

        debug!("Staged hosts content at {}", staged.path().display());
        Ok(staged)
    }

    pub async fn install(&self, staged: NamedTempFile, target: &Path) -> Result<(), HostsError> {
        match self {
            Installer::Direct => {
                if let Ok(meta) = fs::metadata(target) {
                    staged
                        .as_file()
                        .set_permissions(meta.permissions())
                        .map_err(|e| HostsError::io(staged.path(), e))?;
                }
                staged.persist(target).map_err(|e| HostsError::io(target, e.error))?;
            }
            Installer::Command(argv) => {
                run_command(argv, &[staged.path().as_os_str(), target.as_os_str()]).await?;
            }
        }

        info!("Installed new hosts file at {}", target.display());
        Ok(())
    }
}

/// Run `argv` plus `extra` arguments, failing on a non-zero exit.
pub async fn run_command(argv: &[String], extra: &[&OsStr]) -> Result<(), HostsError> {
    let Some((program, args)) = argv.split_first() else {
        return Ok(());
    };
    let rendered = argv.join(" ");

    let child = Command::new(program).args(args).args(extra).kill_on_drop(true).output();

    let output = match tokio::time::timeout(COMMAND_TIMEOUT, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(HostsError::InstallFailed { command: rendered, detail: e.to_string() });
        }
        Err(_) => {
            return Err(HostsError::InstallFailed {
                command: rendered,
                detail: format!("timed out after {:?}", COMMAND_TIMEOUT),
            });
        }
    };

    if !output.status.success() {
        let error_msg = String::from_utf8_lossy(&output.stderr);
        return Err(HostsError::InstallFailed {
            command: rendered,
            detail: format!("{}: {}", output.status, error_msg.trim()),
        });
    }

    Ok(())
}

/// Ask the resolver to drop cached answers. Failure only warns.
pub async fn flush_dns(argv: &[String]) {
    if argv.is_empty() {
        return;
    }
    match run_command(argv, &[]).await {
        Ok(()) => debug!("Flushed DNS cache with `{}`", argv.join(" ")),
        Err(e) => warn!("DNS cache flush failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_from_argv() {
        assert_eq!(Installer::from_argv(&[]), Installer::Direct);
        assert_eq!(Installer::from_argv(&argv(&["cp"])), Installer::Command(argv(&["cp"])));
    }

    #[tokio::test]
    async fn test_direct_install_replaces_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("hosts");
        fs::write(&target, "old\n").unwrap();

        let installer = Installer::Direct;
        let staged = installer.stage(b"new\n", &target, dir.path()).unwrap();
        installer.install(staged, &target).await.unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_command_install_runs_program() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("hosts");
        let scratch = dir.path().join("scratch");
        fs::write(&target, "old\n").unwrap();

        let installer = Installer::Command(argv(&["cp"]));
        let staged = installer.stage(b"copied\n", &target, &scratch).unwrap();
        assert!(staged.path().starts_with(&scratch));
        installer.install(staged, &target).await.unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "copied\n");
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failing_command_reports_and_leaves_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("hosts");
        fs::write(&target, "old\n").unwrap();

        let installer = Installer::Command(argv(&["false"]));
        let staged = installer.stage(b"new\n", &target, dir.path()).unwrap();
        let err = installer.install(staged, &target).await.unwrap_err();

        assert!(matches!(err, HostsError::InstallFailed { .. }));
        assert_eq!(fs::read_to_string(&target).unwrap(), "old\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let result = run_command(&argv(&["/nonexistent/habitlock-installer"]), &[]).await;
        assert!(matches!(result, Err(HostsError::InstallFailed { .. })));
        flush_dns(&argv(&["/nonexistent/flush"])).await;
    }
}
