use crate::connection::Database;
use crate::error::{DbError, Result};
use sqlx::migrate::Migrator;
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

impl Database {
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Applying habit schema migrations");
        MIGRATOR.run(self.pool()?).await?;
        Ok(())
    }

    /// Fail unless every migration shipped with this build has been applied.
    pub async fn verify_migrations(&self) -> Result<()> {
        let applied: Vec<i64> =
            sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version")
                .fetch_all(self.pool()?)
                .await?;

        let missing: Vec<i64> =
            MIGRATOR.iter().map(|m| m.version).filter(|v| !applied.contains(v)).collect();
        if !missing.is_empty() {
            return Err(DbError::InvalidData(format!("habit schema is missing migrations {:?}", missing)));
        }

        info!("Habit schema at version {}", applied.last().copied().unwrap_or_default());
        Ok(())
    }
}
