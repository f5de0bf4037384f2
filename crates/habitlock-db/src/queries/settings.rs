use std::collections::BTreeSet;

use crate::connection::Database;
use crate::error::Result;
use crate::models::DbSettings;
use chrono::Utc;
use habitlock_common::domain::validate_domain;
use habitlock_common::Settings;

pub struct SettingsQueries;

impl SettingsQueries {
    /// Read the singleton settings row. A missing row reads as defaults.
    pub async fn get(db: &Database) -> Result<Settings> {
        let pool = db.pool()?;

        let row = sqlx::query_as::<_, DbSettings>("SELECT * FROM settings WHERE id = 1")
            .fetch_optional(pool)
            .await?;

        match row {
            Some(row) => Settings::try_from(row),
            None => Ok(Settings::default()),
        }
    }

    /// Replace the blocked website list. Each domain is validated and normalized first.
    pub async fn set_blocked_websites(db: &Database, domains: &BTreeSet<String>) -> Result<()> {
        let pool = db.pool()?;

        let validated =
            domains.iter().map(|d| validate_domain(d)).collect::<habitlock_common::Result<BTreeSet<_>>>()?;
        let json = serde_json::to_string(&validated)?;

        sqlx::query(
            r#"
            INSERT INTO settings (id, blocked_websites, updated_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                blocked_websites = excluded.blocked_websites,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabaseConfig;
    use crate::error::DbError;
    use tempfile::tempdir;

    async fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(DatabaseConfig { path: db_path.to_str().unwrap().to_string() })
            .await
            .unwrap();
        db.run_migrations().await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn test_default_settings_are_empty() {
        let (db, _dir) = test_db().await;
        assert!(SettingsQueries::get(&db).await.unwrap().blocked_websites.is_empty());
    }

    #[tokio::test]
    async fn test_set_blocked_websites_normalizes() {
        let (db, _dir) = test_db().await;

        let domains: BTreeSet<String> =
            ["Reddit.com", "www.youtube.com"].into_iter().map(String::from).collect();
        SettingsQueries::set_blocked_websites(&db, &domains).await.unwrap();

        let settings = SettingsQueries::get(&db).await.unwrap();
        let stored: Vec<&str> = settings.blocked_websites.iter().map(String::as_str).collect();
        assert_eq!(stored, vec!["reddit.com", "youtube.com"]);
    }

    #[tokio::test]
    async fn test_invalid_domain_is_rejected() {
        let (db, _dir) = test_db().await;

        let domains: BTreeSet<String> = ["not a domain"].into_iter().map(String::from).collect();
        let err = SettingsQueries::set_blocked_websites(&db, &domains).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidData(_)));
        assert!(SettingsQueries::get(&db).await.unwrap().blocked_websites.is_empty());
    }
}
