use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

pub type HabitId = String;

/// A recurring daily habit the user is held accountable for.
///
/// Times are UTC time-of-day values. Any conversion from the user's local
/// timezone happens once, when the habit is written, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    /// Unique identifier for the habit
    pub id: HabitId,
    /// Display name, e.g. "Make bed"
    pub name: String,
    /// Time of day after which the habit is due. Habits without one never block.
    pub start_time_utc: Option<NaiveTime>,
    /// Time of day after which an unresolved habit is recorded as missed
    pub deadline_utc: Option<NaiveTime>,
    /// Weekday indices (0 = Sunday .. 6 = Saturday). Empty means every day.
    #[serde(default)]
    pub active_days: BTreeSet<u8>,
    /// Whether the habit currently participates in scheduling
    pub is_active: bool,
}

impl Habit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            start_time_utc: None,
            deadline_utc: None,
            active_days: BTreeSet::new(),
            is_active: true,
        }
    }

    pub fn with_start_time(mut self, start: NaiveTime) -> Self {
        self.start_time_utc = Some(start);
        self
    }

    pub fn with_deadline(mut self, deadline: NaiveTime) -> Self {
        self.deadline_utc = Some(deadline);
        self
    }

    pub fn with_active_days(mut self, days: impl IntoIterator<Item = u8>) -> Self {
        self.active_days = days.into_iter().collect();
        self
    }

    /// Whether the habit's schedule applies on the given weekday.
    pub fn applies_on(&self, weekday: Weekday) -> bool {
        self.active_days.is_empty()
            || self.active_days.contains(&weekday_index(weekday))
    }
}

/// Weekday index with Sunday as 0, matching how active days are stored.
pub fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}

/// Validate a set of weekday indices coming from the write side.
pub fn validate_active_days(days: &BTreeSet<u8>) -> Result<()> {
    match days.iter().find(|d| **d > 6) {
        Some(day) => Err(Error::InvalidWeekday(*day)),
        None => Ok(()),
    }
}

/// Parse a time of day in `HH:MM` or `HH:MM:SS` form.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| Error::InvalidTime(value.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Completed,
    Skipped,
    Missed,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Completed => "completed",
            LogStatus::Skipped => "skipped",
            LogStatus::Missed => "missed",
        }
    }

    /// Completed and skipped both count as the user having dealt with the habit.
    pub fn resolves(&self) -> bool {
        matches!(self, LogStatus::Completed | LogStatus::Skipped)
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(LogStatus::Completed),
            "skipped" => Ok(LogStatus::Skipped),
            "missed" => Ok(LogStatus::Missed),
            other => Err(Error::InvalidStatus(other.to_string())),
        }
    }
}

/// One habit's outcome for one calendar day. At most one exists per
/// `(habit_id, date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitLog {
    pub id: String,
    pub habit_id: HabitId,
    pub date: NaiveDate,
    pub status: LogStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

impl HabitLog {
    pub fn new(habit_id: impl Into<HabitId>, date: NaiveDate, status: LogStatus) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            habit_id: habit_id.into(),
            date,
            status,
            completed_at: None,
        }
    }

    pub fn completed(habit_id: impl Into<HabitId>, at: DateTime<Utc>) -> Self {
        let mut log = Self::new(habit_id, at.date_naive(), LogStatus::Completed);
        log.completed_at = Some(at);
        log
    }

    pub fn missed(habit_id: impl Into<HabitId>, date: NaiveDate) -> Self {
        Self::new(habit_id, date, LogStatus::Missed)
    }
}

/// Singleton user settings relevant to blocking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Pre-validated hostnames to block while any habit is overdue
    #[serde(default)]
    pub blocked_websites: BTreeSet<String>,
}

/// What the hosts file should look like after this cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingDecision {
    pub should_block: bool,
    pub target_domains: BTreeSet<String>,
}

impl BlockingDecision {
    pub fn unblocked() -> Self {
        Self::default()
    }

    pub fn block(domains: BTreeSet<String>) -> Self {
        Self { should_block: true, target_domains: domains }
    }
}
