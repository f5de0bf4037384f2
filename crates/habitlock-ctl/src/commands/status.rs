use std::path::Path;

use anyhow::{Context, Result};
use habitlock_common::schedule::describe_domains;
use habitlock_proto::DaemonStatus;

pub fn show(status_file: &Path, json: bool) -> Result<()> {
    let status = DaemonStatus::read_from(status_file)
        .with_context(|| format!("Failed to read daemon status from {}", status_file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", render(&status));
    }

    Ok(())
}

fn render(status: &DaemonStatus) -> String {
    let mut out = String::new();
    out.push_str("habitlock status\n");
    out.push_str("================\n");
    out.push_str(&format!("Running:        {}\n", if status.is_running { "yes" } else { "no" }));
    out.push_str(&format!(
        "Last check:     {}\n",
        status.last_check.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
    ));
    out.push_str(&format!("Should block:   {}\n", status.should_block));
    out.push_str(&format!("Blocked:        {}\n", describe_domains(&status.currently_blocked_domains)));

    if !status.overdue_habits.is_empty() {
        out.push_str(&format!("Overdue habits: {}\n", status.overdue_habits.join(", ")));
    }
    if let Some(start) = status.next_habit_start {
        out.push_str(&format!("Next habit at:  {} UTC\n", start.format("%H:%M")));
    }
    if let Some(error) = &status.last_error {
        out.push_str(&format!("Last error:     {}\n", error));
    }

    out
}
