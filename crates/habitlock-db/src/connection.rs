use crate::error::{DbError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const MAX_CONNECTIONS: u32 = 4;

/// The habit editor writes to the same file; wait on its locks instead of failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Bare path or `sqlite://` URL
    pub path: String,
}

impl DatabaseConfig {
    pub fn file_path(&self) -> PathBuf {
        PathBuf::from(self.path.strip_prefix("sqlite://").unwrap_or(&self.path))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "habitlock.db".to_string() }
    }
}

/// Handle on the habit database shared by the daemon's store.
#[derive(Clone)]
pub struct Database {
    pool: Option<Pool<Sqlite>>,
}

impl Database {
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let file = config.file_path();
        ensure_parent_dir(&file)?;

        let options = SqliteConnectOptions::new()
            .filename(&file)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        info!("Opened habit database at {}", file.display());
        Ok(Self { pool: Some(pool) })
    }

    pub fn pool(&self) -> Result<&Pool<Sqlite>> {
        self.pool.as_ref().ok_or_else(|| DbError::InvalidData("habit database is closed".to_string()))
    }

    pub async fn close(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!("Habit database closed");
        }
    }
}

fn ensure_parent_dir(file: &Path) -> Result<()> {
    if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            debug!("Created database directory {}", parent.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_path_strips_url_scheme() {
        let url = DatabaseConfig { path: "sqlite:///var/lib/habitlock/habitlock.db".to_string() };
        assert_eq!(url.file_path(), PathBuf::from("/var/lib/habitlock/habitlock.db"));

        let bare = DatabaseConfig { path: "data/habitlock.db".to_string() };
        assert_eq!(bare.file_path(), PathBuf::from("data/habitlock.db"));
    }

    #[tokio::test]
    async fn test_pragmas_for_shared_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("habitlock.db");
        let db = Database::new(DatabaseConfig { path: format!("sqlite://{}", path.display()) })
            .await
            .unwrap();
        assert!(path.exists());

        let pool = db.pool().unwrap();
        let journal: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(pool).await.unwrap();
        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(pool).await.unwrap();
        let busy: i64 = sqlx::query_scalar("PRAGMA busy_timeout").fetch_one(pool).await.unwrap();

        assert_eq!(journal.to_lowercase(), "wal");
        assert_eq!(foreign_keys, 1);
        assert_eq!(busy, 5000);
    }

    #[tokio::test]
    async fn test_close_shuts_clones_too() {
        let dir = tempdir().unwrap();
        let db = Database::new(DatabaseConfig { path: dir.path().join("habitlock.db").display().to_string() })
            .await
            .unwrap();
        let store_handle = db.clone();

        db.close().await;
        assert!(store_handle.pool().unwrap().is_closed());
    }
}
