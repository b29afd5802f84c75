//! Daily briefing report.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::journal::{DailyJsonJournal, EventType, Journal, JournalEntry};
use crate::store::{Stage, TaskStore};
use crate::Result;

const ERROR_EVENTS: &[&str] = &[
    "action_failed",
    "data_error",
    "job_failed",
    "sync_failed",
    "worker_disabled",
];

const RECENT_ERRORS: usize = 10;

/// Write `Briefings/YYYY-MM-DD_Briefing.md` for today.
///
/// Returns `None` when today's briefing already exists and `force` is not
/// set.
///
/// # Errors
///
/// Returns `AppError::Io` if the store cannot be listed or the briefing
/// cannot be written, `AppError::Journal` if today's journal is unreadable.
pub fn write_daily_briefing(
    store: &TaskStore,
    journal: &DailyJsonJournal,
    actor: &str,
    force: bool,
) -> Result<Option<PathBuf>> {
    let today = Utc::now().date_naive();
    let path = store.briefings_dir().join(format!("{today}_Briefing.md"));
    if path.exists() && !force {
        return Ok(None);
    }

    let mut counts = vec![(
        Stage::NeedsAction.to_string(),
        store.list(&Stage::NeedsAction, "*.md")?.len(),
    )];
    for agent in store.claim_agents()? {
        let stage = Stage::InProgress(agent);
        counts.push((stage.to_string(), store.list(&stage, "*.md")?.len()));
    }
    for stage in [Stage::PendingApproval, Stage::Approved, Stage::Rejected, Stage::Done] {
        counts.push((stage.to_string(), store.list(&stage, "*.md")?.len()));
    }

    let events = journal.read_day(today)?;
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for event in &events {
        *by_type.entry(event_type(event).to_owned()).or_default() += 1;
    }
    let errors: Vec<&Value> = events
        .iter()
        .filter(|e| ERROR_EVENTS.contains(&event_type(e)))
        .collect();
    let health = events
        .iter()
        .rev()
        .find(|e| event_type(e) == "watchdog_health_check");

    let mut out = format!(
        "---\ntype: briefing\ndate: {today}\ngenerated: {}\n---\n\n# Daily Briefing {today}\n\n\
         ## Task Pipeline\n\n| Stage | Files |\n|---|---|\n",
        Utc::now().to_rfc3339()
    );
    for (stage, count) in &counts {
        let _ = writeln!(out, "| {stage} | {count} |");
    }

    out.push_str("\n## Activity Today\n\n");
    if by_type.is_empty() {
        out.push_str("No events recorded.\n");
    }
    for (kind, count) in &by_type {
        let _ = writeln!(out, "- {kind}: {count}");
    }

    let _ = write!(out, "\n## Errors ({})\n\n", errors.len());
    if errors.is_empty() {
        out.push_str("None.\n");
    }
    for event in errors.iter().rev().take(RECENT_ERRORS) {
        let _ = writeln!(
            out,
            "- {} `{}` {}: {}",
            field(event, "timestamp"),
            event_type(event),
            field(event, "file"),
            field(event, "reason"),
        );
    }

    out.push_str("\n## Worker Health\n\n");
    match health.and_then(|h| h.get("workers")).and_then(Value::as_object) {
        Some(workers) => {
            out.push_str("| Worker | Alive | Enabled | Restarts |\n|---|---|---|---|\n");
            for (name, state) in workers {
                let _ = writeln!(
                    out,
                    "| {name} | {} | {} | {} |",
                    state.get("alive").unwrap_or(&Value::Null),
                    state.get("enabled").unwrap_or(&Value::Null),
                    state.get("restart_count").unwrap_or(&Value::Null),
                );
            }
        }
        None => out.push_str("No watchdog health record today.\n"),
    }

    store.write_file(&path, &out)?;
    info!(path = %path.display(), "daily briefing written");
    journal.record_or_warn(
        JournalEntry::new(EventType::BriefingWritten, actor)
            .with_detail("path", path.display().to_string())
            .with_detail("errors", errors.len()),
    );
    Ok(Some(path))
}

fn event_type(event: &Value) -> &str {
    event.get("event_type").and_then(Value::as_str).unwrap_or("unknown")
}

fn field<'a>(event: &'a Value, key: &str) -> &'a str {
    event.get(key).and_then(Value::as_str).unwrap_or("-")
}
