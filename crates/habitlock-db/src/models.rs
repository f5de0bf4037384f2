use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use habitlock_common::{parse_time_of_day, Habit, HabitLog, LogStatus, Settings};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{DbError, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbHabit {
    pub id: String,
    pub name: String,
    pub start_time_utc: Option<String>,
    pub deadline_utc: Option<String>,
    pub active_days: Option<String>, // JSON array of weekday indices
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbHabit> for Habit {
    type Error = DbError;

    fn try_from(row: DbHabit) -> Result<Self> {
        let start_time_utc = row.start_time_utc.as_deref().map(parse_time_of_day).transpose()?;
        let deadline_utc = row.deadline_utc.as_deref().map(parse_time_of_day).transpose()?;
        let active_days: BTreeSet<u8> = match row.active_days.as_deref() {
            Some(json) if !json.trim().is_empty() => serde_json::from_str(json)?,
            _ => BTreeSet::new(),
        };
        habitlock_common::validate_active_days(&active_days)?;

        Ok(Habit {
            id: row.id,
            name: row.name,
            start_time_utc,
            deadline_utc,
            active_days,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbHabitLog {
    pub id: String,
    pub habit_id: String,
    pub date: String,
    pub status: String, // "completed", "skipped", "missed"
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbHabitLog> for HabitLog {
    type Error = DbError;

    fn try_from(row: DbHabitLog) -> Result<Self> {
        let date = NaiveDate::parse_from_str(&row.date, DATE_FORMAT)
            .map_err(|e| DbError::InvalidData(format!("bad log date {:?}: {}", row.date, e)))?;
        let status: LogStatus = row.status.parse()?;

        Ok(HabitLog {
            id: row.id,
            habit_id: row.habit_id,
            date,
            status,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbSettings {
    pub id: i64,
    pub blocked_websites: String, // JSON array of domains
    pub updated_at: String,
}

impl TryFrom<DbSettings> for Settings {
    type Error = DbError;

    fn try_from(row: DbSettings) -> Result<Self> {
        let blocked_websites: BTreeSet<String> = serde_json::from_str(&row.blocked_websites)?;
        Ok(Settings { blocked_websites })
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
