//! Inter-agent signals and the dashboard merge.
//!
//! A signal is a small header/body file in `Signals`. Rolling signals are
//! overwritten in place; point-in-time signals get unique names and are
//! archived to `Done` once merged.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};

use crate::journal::{EventType, Journal, JournalEntry};
use crate::store::{list_dir, naming, read_task, Header, TaskFile, TaskStore};
use crate::{AppError, Result};

/// Rolling replication status, overwritten by every sync.
pub const SYNC_STATUS: &str = "SYNC_STATUS.md";

/// Dashboard file at the vault root.
pub const DASHBOARD: &str = "Dashboard.md";

const DASHBOARD_SECTION: &str = "## Cloud Agent Status";

/// Whether a signal is overwritten or accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Overwritten in place.
    Rolling,
    /// Uniquely named, archived after merge.
    PointInTime,
}

impl SignalKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Rolling => "rolling",
            Self::PointInTime => "point_in_time",
        }
    }
}

/// Writes signals on behalf of one agent.
#[derive(Debug, Clone)]
pub struct SignalWriter {
    store: TaskStore,
    agent: String,
}

impl SignalWriter {
    /// Writer for `agent` into the store's `Signals` directory.
    #[must_use]
    pub fn new(store: TaskStore, agent: impl Into<String>) -> Self {
        Self {
            store,
            agent: agent.into(),
        }
    }

    /// Overwrite `Signals/<name>` with the given status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` on write failure.
    pub fn write_rolling(
        &self,
        name: &str,
        status: &str,
        details: &[(&str, String)],
    ) -> Result<PathBuf> {
        let path = self.store.signals_dir().join(name);
        let task = self.render(SignalKind::Rolling, naming::stem(name), status, details);
        self.store.write_file(&path, &task.render())?;
        Ok(path)
    }

    /// Write a uniquely named `Signals/{prefix}_{ts}_{hash}.md`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` on write failure.
    pub fn write_point(
        &self,
        prefix: &str,
        status: &str,
        details: &[(&str, String)],
    ) -> Result<PathBuf> {
        let name = naming::unique_task_name(prefix);
        let path = self.store.signals_dir().join(&name);
        let task = self.render(SignalKind::PointInTime, prefix, status, details);
        self.store.write_file(&path, &task.render())?;
        Ok(path)
    }

    fn render(
        &self,
        kind: SignalKind,
        title: &str,
        status: &str,
        details: &[(&str, String)],
    ) -> TaskFile {
        let mut header = Header::new()
            .with("type", "signal")
            .with("signal", kind.as_str())
            .with("agent", self.agent.as_str())
            .with("status", status)
            .with("timestamp", Utc::now().to_rfc3339());
        for (key, value) in details {
            header.set(key, value.as_str());
        }
        let mut body = format!("\n# {title}\n\n");
        for (key, value) in details {
            let _ = writeln!(body, "- **{key}**: {value}");
        }
        TaskFile::new(header, body)
    }
}

/// Outcome of a signal merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Signals rendered into the dashboard.
    pub merged: usize,
    /// Point-in-time signals moved to `Done`.
    pub archived: usize,
}

/// Merge cloud-side signals into `Dashboard.md` and archive every
/// agent's point-in-time signals as `Done/SIGNAL_<name>`.
///
/// Only `CLOUD_*` signals and the sync status are rendered; other agents'
/// point-in-time signals are archived without being rendered.
///
/// # Errors
///
/// Returns `AppError::Io` if the dashboard cannot be read or written.
/// Individual unreadable signals are skipped with a warning.
pub fn merge_signals(store: &TaskStore, journal: &dyn Journal, actor: &str) -> Result<MergeReport> {
    let dir = store.signals_dir();
    let names = list_dir(&dir, "*.md")?;
    if names.is_empty() {
        return Ok(MergeReport::default());
    }

    let mut rows = Vec::new();
    let mut point_in_time = Vec::new();
    for name in &names {
        let signal = match read_task(&dir.join(name)) {
            Ok(signal) => signal,
            Err(err) => {
                warn!(signal = name, %err, "skipping unreadable signal");
                continue;
            }
        };
        let rendered = name == SYNC_STATUS || name.starts_with("CLOUD_");
        let kind = signal.header.get("signal");
        let archive = if rendered {
            name != SYNC_STATUS && kind != Some(SignalKind::Rolling.as_str())
        } else {
            kind == Some(SignalKind::PointInTime.as_str())
        };
        if archive {
            point_in_time.push(name.clone());
        }
        if rendered {
            rows.push((name.clone(), signal));
        }
    }

    if !rows.is_empty() {
        let section = render_section(&rows);
        let dashboard_path = store.root().join(DASHBOARD);
        let existing = match fs::read_to_string(&dashboard_path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => "# Dashboard\n".to_owned(),
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to read {}: {err}",
                    dashboard_path.display()
                )))
            }
        };
        store.write_file(&dashboard_path, &upsert_section(&existing, &section))?;
    }

    let mut archived = 0;
    for name in &point_in_time {
        match store.archive_path(&dir.join(name), &format!("SIGNAL_{name}")) {
            Ok(_) => archived += 1,
            Err(err) => warn!(signal = name, %err, "failed to archive signal"),
        }
    }

    let report = MergeReport {
        merged: rows.len(),
        archived,
    };
    if report == MergeReport::default() {
        return Ok(report);
    }
    info!(merged = report.merged, archived = report.archived, "signals merged into dashboard");
    journal.record_or_warn(
        JournalEntry::new(EventType::SignalsMerged, actor)
            .with_detail("merged", report.merged)
            .with_detail("archived", report.archived),
    );
    Ok(report)
}

fn render_section(rows: &[(String, TaskFile)]) -> String {
    let mut out = format!(
        "{DASHBOARD_SECTION}\n\n_Last merged: {} UTC_\n\n| Signal | Agent | Status | Updated | Details |\n|---|---|---|---|---|\n",
        Utc::now().format("%Y-%m-%d %H:%M")
    );
    for (name, signal) in rows {
        let header = &signal.header;
        let details = header
            .iter()
            .filter(|(k, _)| !matches!(*k, "type" | "signal" | "agent" | "status" | "timestamp"))
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            naming::stem(name),
            header.get("agent").unwrap_or("-"),
            header.get("status").unwrap_or("-"),
            header.get("timestamp").unwrap_or("-"),
            if details.is_empty() { "-" } else { &details },
        );
    }
    out
}

/// Replace the dashboard status section, or append it when absent.
fn upsert_section(existing: &str, section: &str) -> String {
    let pattern = format!(
        r"(?ms)^{}[ \t]*\r?\n.*?(^## |\z)",
        regex::escape(DASHBOARD_SECTION)
    );
    if let Ok(re) = Regex::new(&pattern) {
        if re.is_match(existing) {
            return re
                .replacen(existing, 1, |caps: &regex::Captures<'_>| {
                    let next = caps.get(1).map_or("", |m| m.as_str());
                    if next.is_empty() {
                        section.to_owned()
                    } else {
                        format!("{section}\n{next}")
                    }
                })
                .into_owned();
        }
    }
    let mut out = existing.trim_end().to_owned();
    out.push_str("\n\n");
    out.push_str(section);
    out
}
