// Schedule Evaluation Module
//
// Decides, from habit definitions, today's logs and the current instant,
// whether blocking should be active and which habits must be recorded as
// missed. Everything is compared as UTC time-of-day; no I/O happens here.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::normalize_domains;
use crate::types::{BlockingDecision, Habit, HabitId, HabitLog, Settings};

/// Outcome of evaluating the schedule at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// True when at least one due habit is unresolved today
    pub should_block: bool,
    /// Due habits without a completed or skipped log today
    pub overdue: Vec<HabitId>,
    /// Habits past their deadline with no log at all today
    pub missed_intents: Vec<HabitId>,
}

impl Evaluation {
    /// Combine with settings into the decision the hosts file should reflect.
    pub fn decision(&self, settings: &Settings) -> BlockingDecision {
        if self.should_block {
            BlockingDecision::block(normalize_domains(&settings.blocked_websites))
        } else {
            BlockingDecision::unblocked()
        }
    }
}

/// Evaluate all habits at `now`.
///
/// Blocking is OR-to-set and AND-to-clear: any single overdue habit blocks,
/// and only resolving every overdue habit unblocks. Logs dated other than
/// `now`'s calendar day are ignored.
pub fn evaluate(
    now: DateTime<Utc>,
    habits: &[Habit],
    today_logs: &HashMap<HabitId, HabitLog>,
) -> Evaluation {
    let today = now.date_naive();
    let weekday = now.weekday();
    let time = now.time();

    let mut evaluation = Evaluation::default();

    for habit in habits {
        let log = today_logs.get(&habit.id).filter(|log| log.date == today && log.habit_id == habit.id);

        if is_due(habit, weekday, time) && !log.is_some_and(|l| l.status.resolves()) {
            evaluation.overdue.push(habit.id.clone());
        }

        if is_past_deadline(habit, weekday, time) && log.is_none() {
            evaluation.missed_intents.push(habit.id.clone());
        }
    }

    evaluation.should_block = !evaluation.overdue.is_empty();
    evaluation
}

/// A habit is due once its start time has passed on an active day.
fn is_due(habit: &Habit, weekday: Weekday, time: NaiveTime) -> bool {
    let Some(start) = habit.start_time_utc else {
        return false;
    };
    habit.is_active && habit.applies_on(weekday) && time >= start
}

fn is_past_deadline(habit: &Habit, weekday: Weekday, time: NaiveTime) -> bool {
    let Some(deadline) = habit.deadline_utc else {
        return false;
    };
    habit.is_active && habit.applies_on(weekday) && time >= deadline
}

/// Index logs by habit, keeping only those for `date`.
pub fn logs_for_day<I>(logs: I, date: NaiveDate) -> HashMap<HabitId, HabitLog>
where
    I: IntoIterator<Item = HabitLog>,
{
    logs.into_iter().filter(|log| log.date == date).map(|log| (log.habit_id.clone(), log)).collect()
}

/// Habits that will be due later today, in start order. Used for status output.
pub fn upcoming_today(now: DateTime<Utc>, habits: &[Habit]) -> Vec<(HabitId, NaiveTime)> {
    let weekday = now.weekday();
    let time = now.time();

    let mut upcoming: Vec<(HabitId, NaiveTime)> = habits
        .iter()
        .filter(|h| h.is_active && h.applies_on(weekday))
        .filter_map(|h| h.start_time_utc.filter(|start| *start > time).map(|s| (h.id.clone(), s)))
        .collect();
    upcoming.sort_by_key(|(_, start)| *start);
    upcoming
}

/// Domains referenced by an evaluation, for log lines.
pub fn describe_domains(domains: &BTreeSet<String>) -> String {
    if domains.is_empty() {
        "<none>".to_string()
    } else {
        domains.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}
