use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use habitlock_common::schedule::logs_for_day;
use habitlock_common::{Habit, HabitId, HabitLog, Settings};
use habitlock_db::queries::{HabitLogQueries, HabitQueries, SettingsQueries};
use habitlock_db::{Database, DbError};
use tokio::sync::RwLock;

pub type StoreResult<T> = std::result::Result<T, DbError>;

/// The slice of persistence the daemon consumes. Habits and settings are
/// read-only here; the only write is recording a missed day.
#[async_trait]
pub trait HabitStore: Send + Sync {
    async fn get_active_habits(&self) -> StoreResult<Vec<Habit>>;

    async fn get_today_log(&self, habit_id: &str, date: NaiveDate) -> StoreResult<Option<HabitLog>>;

    async fn get_today_logs(&self, date: NaiveDate) -> StoreResult<HashMap<HabitId, HabitLog>>;

    async fn get_settings(&self) -> StoreResult<Settings>;

    /// Returns true when a new log was written.
    async fn upsert_missed_log(&self, habit_id: &str, date: NaiveDate) -> StoreResult<bool>;
}

pub struct SqliteHabitStore {
    db: Database,
}

impl SqliteHabitStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl HabitStore for SqliteHabitStore {
    async fn get_active_habits(&self) -> StoreResult<Vec<Habit>> {
        HabitQueries::load_active(&self.db).await
    }

    async fn get_today_log(&self, habit_id: &str, date: NaiveDate) -> StoreResult<Option<HabitLog>> {
        HabitLogQueries::get_for_day(&self.db, habit_id, date).await
    }

    async fn get_today_logs(&self, date: NaiveDate) -> StoreResult<HashMap<HabitId, HabitLog>> {
        Ok(logs_for_day(HabitLogQueries::list_for_day(&self.db, date).await?, date))
    }

    async fn get_settings(&self) -> StoreResult<Settings> {
        SettingsQueries::get(&self.db).await
    }

    async fn upsert_missed_log(&self, habit_id: &str, date: NaiveDate) -> StoreResult<bool> {
        HabitLogQueries::upsert_missed(&self.db, habit_id, date).await
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    habits: Vec<Habit>,
    logs: Vec<HabitLog>,
    settings: Settings,
    fail_reads: bool,
}

/// In-process store for tests and dry runs. Mirrors the SQLite upsert rules:
/// one log per habit per day, missed never overwrites.
#[derive(Debug, Clone, Default)]
pub struct MemoryHabitStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryHabitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_habit(&self, habit: Habit) {
        self.state.write().await.habits.push(habit);
    }

    pub async fn set_blocked_websites<I, S>(&self, domains: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.write().await.settings.blocked_websites =
            domains.into_iter().map(Into::into).collect();
    }

    /// Record a user action, replacing any log for the same day.
    pub async fn record(&self, log: HabitLog) {
        let mut state = self.state.write().await;
        state.logs.retain(|l| !(l.habit_id == log.habit_id && l.date == log.date));
        state.logs.push(log);
    }

    pub async fn logs(&self) -> Vec<HabitLog> {
        self.state.read().await.logs.clone()
    }

    /// Make every read fail, to exercise the transient-error path.
    pub async fn set_fail_reads(&self, fail: bool) {
        self.state.write().await.fail_reads = fail;
    }

    async fn check_reads(&self) -> StoreResult<()> {
        if self.state.read().await.fail_reads {
            return Err(DbError::InvalidData("simulated read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl HabitStore for MemoryHabitStore {
    async fn get_active_habits(&self) -> StoreResult<Vec<Habit>> {
        self.check_reads().await?;
        Ok(self.state.read().await.habits.iter().filter(|h| h.is_active).cloned().collect())
    }

    async fn get_today_log(&self, habit_id: &str, date: NaiveDate) -> StoreResult<Option<HabitLog>> {
        self.check_reads().await?;
        let state = self.state.read().await;
        Ok(state.logs.iter().find(|l| l.habit_id == habit_id && l.date == date).cloned())
    }

    async fn get_today_logs(&self, date: NaiveDate) -> StoreResult<HashMap<HabitId, HabitLog>> {
        self.check_reads().await?;
        Ok(logs_for_day(self.state.read().await.logs.clone(), date))
    }

    async fn get_settings(&self) -> StoreResult<Settings> {
        self.check_reads().await?;
        Ok(self.state.read().await.settings.clone())
    }

    async fn upsert_missed_log(&self, habit_id: &str, date: NaiveDate) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.logs.iter().any(|l| l.habit_id == habit_id && l.date == date) {
            return Ok(false);
        }
        state.logs.push(HabitLog::missed(habit_id, date));
        Ok(true)
    }
}
