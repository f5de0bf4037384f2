use crate::connection::Database;
use crate::error::{DbError, Result};
use crate::models::{format_date, DbHabitLog};
use chrono::{DateTime, NaiveDate, Utc};
use habitlock_common::{HabitLog, LogStatus};
use uuid::Uuid;

pub struct HabitLogQueries;

impl HabitLogQueries {
    /// Record a missed day. Never overwrites an existing log for the same day,
    /// so re-issuing the same intent every cycle is harmless.
    ///
    /// Returns true when a row was inserted.
    pub async fn upsert_missed(db: &Database, habit_id: &str, date: NaiveDate) -> Result<bool> {
        let pool = db.pool()?;

        let result = sqlx::query(
            r#"
            INSERT INTO habit_logs (id, habit_id, date, status, completed_at, created_at)
            VALUES (?, ?, ?, 'missed', NULL, ?)
            ON CONFLICT(habit_id, date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(habit_id)
        .bind(format_date(date))
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a user action. Replaces whatever was logged for that day,
    /// including a `missed` entry written by the daemon.
    pub async fn record_user_action(
        db: &Database,
        habit_id: &str,
        date: NaiveDate,
        status: LogStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let pool = db.pool()?;

        sqlx::query(
            r#"
            INSERT INTO habit_logs (id, habit_id, date, status, completed_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(habit_id, date) DO UPDATE SET
                status = excluded.status,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(habit_id)
        .bind(format_date(date))
        .bind(status.as_str())
        .bind(completed_at)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_for_day(
        db: &Database,
        habit_id: &str,
        date: NaiveDate,
    ) -> Result<Option<HabitLog>> {
        let pool = db.pool()?;

        let row = sqlx::query_as::<_, DbHabitLog>(
            "SELECT * FROM habit_logs WHERE habit_id = ? AND date = ?",
        )
        .bind(habit_id)
        .bind(format_date(date))
        .fetch_optional(pool)
        .await
        .map_err(DbError::Sqlx)?;

        row.map(HabitLog::try_from).transpose()
    }

    pub async fn list_for_day(db: &Database, date: NaiveDate) -> Result<Vec<HabitLog>> {
        let pool = db.pool()?;

        sqlx::query_as::<_, DbHabitLog>("SELECT * FROM habit_logs WHERE date = ? ORDER BY habit_id")
            .bind(format_date(date))
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(HabitLog::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabaseConfig;
    use crate::queries::HabitQueries;
    use habitlock_common::Habit;
    use tempfile::tempdir;

    async fn test_db_with_habit() -> (Database, Habit, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::new(DatabaseConfig { path: db_path.to_str().unwrap().to_string() })
            .await
            .unwrap();
        db.run_migrations().await.unwrap();

        let habit = Habit::new("Make bed");
        HabitQueries::create(&db, &habit).await.unwrap();
        (db, habit, dir)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 19).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_missed_is_idempotent() {
        let (db, habit, _dir) = test_db_with_habit().await;

        assert!(HabitLogQueries::upsert_missed(&db, &habit.id, day()).await.unwrap());
        assert!(!HabitLogQueries::upsert_missed(&db, &habit.id, day()).await.unwrap());

        let logs = HabitLogQueries::list_for_day(&db, day()).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, LogStatus::Missed);
    }

    #[tokio::test]
    async fn test_missed_never_overwrites_user_action() {
        let (db, habit, _dir) = test_db_with_habit().await;

        HabitLogQueries::record_user_action(&db, &habit.id, day(), LogStatus::Completed, None)
            .await
            .unwrap();
        assert!(!HabitLogQueries::upsert_missed(&db, &habit.id, day()).await.unwrap());

        let log = HabitLogQueries::get_for_day(&db, &habit.id, day()).await.unwrap().unwrap();
        assert_eq!(log.status, LogStatus::Completed);
    }

    #[tokio::test]
    async fn test_user_action_overwrites_missed() {
        let (db, habit, _dir) = test_db_with_habit().await;

        HabitLogQueries::upsert_missed(&db, &habit.id, day()).await.unwrap();
        let at = day().and_hms_opt(10, 30, 0).unwrap().and_utc();
        HabitLogQueries::record_user_action(&db, &habit.id, day(), LogStatus::Completed, Some(at))
            .await
            .unwrap();

        let logs = HabitLogQueries::list_for_day(&db, day()).await.unwrap();
        assert_eq!(logs.len(), 1, "one row per habit per day");
        assert_eq!(logs[0].status, LogStatus::Completed);
        assert_eq!(logs[0].completed_at, Some(at));
    }

    #[tokio::test]
    async fn test_logs_are_scoped_to_day() {
        let (db, habit, _dir) = test_db_with_habit().await;

        let yesterday = day().pred_opt().unwrap();
        HabitLogQueries::upsert_missed(&db, &habit.id, yesterday).await.unwrap();

        assert!(HabitLogQueries::get_for_day(&db, &habit.id, day()).await.unwrap().is_none());
        assert!(HabitLogQueries::list_for_day(&db, day()).await.unwrap().is_empty());
        assert_eq!(HabitLogQueries::list_for_day(&db, yesterday).await.unwrap().len(), 1);
    }
}
