use crate::connection::Database;
use crate::error::{DbError, Result};
use crate::models::{DbHabit, TIME_FORMAT};
use chrono::{NaiveTime, Utc};
use habitlock_common::{validate_active_days, Habit};

pub struct HabitQueries;

fn format_time(time: Option<NaiveTime>) -> Option<String> {
    time.map(|t| t.format(TIME_FORMAT).to_string())
}

impl HabitQueries {
    /// Insert a habit. Times must already be converted to UTC by the caller.
    pub async fn create(db: &Database, habit: &Habit) -> Result<DbHabit> {
        let pool = db.pool()?;

        validate_active_days(&habit.active_days)?;
        let active_days = if habit.active_days.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&habit.active_days)?)
        };
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO habits (id, name, start_time_utc, deadline_utc, active_days, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&habit.id)
        .bind(&habit.name)
        .bind(format_time(habit.start_time_utc))
        .bind(format_time(habit.deadline_utc))
        .bind(active_days)
        .bind(habit.is_active)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await;

        match result {
            Ok(_) => Self::get_by_id(db, &habit.id).await,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DbError::Duplicate(format!("Habit '{}' already exists", habit.id)))
            }
            Err(e) => Err(DbError::Sqlx(e)),
        }
    }

    pub async fn get_by_id(db: &Database, id: &str) -> Result<DbHabit> {
        let pool = db.pool()?;

        sqlx::query_as::<_, DbHabit>("SELECT * FROM habits WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Habit {} not found", id)))
    }

    pub async fn list_active(db: &Database) -> Result<Vec<DbHabit>> {
        let pool = db.pool()?;

        sqlx::query_as::<_, DbHabit>("SELECT * FROM habits WHERE is_active = ? ORDER BY start_time_utc, name")
            .bind(true)
            .fetch_all(pool)
            .await
            .map_err(DbError::Sqlx)
    }

    /// Active habits converted to domain types. Rows that fail to convert are an error
    /// so a corrupt row never silently stops blocking.
    pub async fn load_active(db: &Database) -> Result<Vec<Habit>> {
        Self::list_active(db).await?.into_iter().map(Habit::try_from).collect()
    }

    pub async fn set_active(db: &Database, id: &str, active: bool) -> Result<()> {
        let pool = db.pool()?;

        let result = sqlx::query("UPDATE habits SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("Habit {} not found", id)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DatabaseConfig;
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
    async fn test_create_and_load_habit() {
        let (db, _dir) = test_db().await;

        let habit = Habit::new("Make bed")
            .with_start_time(NaiveTime::from_hms_opt(7, 0, 0).unwrap())
            .with_active_days([1, 3, 5]);
        HabitQueries::create(&db, &habit).await.unwrap();

        let loaded = HabitQueries::load_active(&db).await.unwrap();
        assert_eq!(loaded, vec![habit]);
    }

    #[tokio::test]
    async fn test_duplicate_habit_is_rejected() {
        let (db, _dir) = test_db().await;

        let habit = Habit::new("Meditate");
        HabitQueries::create(&db, &habit).await.unwrap();
        let err = HabitQueries::create(&db, &habit).await.unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_inactive_habits_are_not_listed() {
        let (db, _dir) = test_db().await;

        let keep = Habit::new("Read");
        let pause = Habit::new("Run");
        HabitQueries::create(&db, &keep).await.unwrap();
        HabitQueries::create(&db, &pause).await.unwrap();
        HabitQueries::set_active(&db, &pause.id, false).await.unwrap();

        let ids: Vec<String> =
            HabitQueries::load_active(&db).await.unwrap().into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![keep.id]);

        assert!(matches!(
            HabitQueries::set_active(&db, "missing", true).await,
            Err(DbError::NotFound(_))
        ));
    }
}
