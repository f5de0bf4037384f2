use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

use habitlock_common::schedule::describe_domains;

/// Failures touching the hosts file, its backups, or the privileged install.
#[derive(Error, Debug)]
pub enum HostsError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed marked region in {path}: {reason}")]
    MalformedRegion { path: PathBuf, reason: String },

    #[error("Install command `{command}` failed: {detail}")]
    InstallFailed { command: String, detail: String },
}

impl HostsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HostsError::Io { path: path.into(), source }
    }
}

/// Daemon error taxonomy. Only `Config` is fatal; everything else is
/// reported at the cycle boundary and retried on the next wake.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Store read failed: {0}")]
    StoreRead(#[source] habitlock_db::DbError),

    #[error("Store write failed: {0}")]
    StoreWrite(#[source] habitlock_db::DbError),

    #[error("Privileged write failed for [{}]: {source}", describe_domains(.domains))]
    PrivilegeWrite {
        domains: BTreeSet<String>,
        #[source]
        source: HostsError,
    },

    #[error("Hosts file unreadable: {0}")]
    HostsRead(#[source] HostsError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] habitlock_proto::ProtoError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DaemonError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DaemonError::Config(_))
    }
}
