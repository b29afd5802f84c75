//! Daily JSON-array journal writer.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{Journal, JournalEntry};
use crate::{AppError, Result};

/// A journal that keeps one JSON array per day in `<logs_dir>/YYYY-MM-DD.json`.
///
/// Every append reads the day file, pushes the entry and rewrites the file
/// through a temporary file and rename, so readers never observe a
/// truncated array. The mutex serializes writers inside one process only.
pub struct DailyJsonJournal {
    logs_dir: PathBuf,
    dry_run: bool,
    lock: Mutex<()>,
}

impl DailyJsonJournal {
    /// Construct a journal that stores day files in `logs_dir`.
    ///
    /// Creates `logs_dir` if it does not exist, unless `dry_run` is set.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Journal`] if the directory cannot be created.
    pub fn new(logs_dir: PathBuf, dry_run: bool) -> Result<Self> {
        if !dry_run {
            fs::create_dir_all(&logs_dir).map_err(|e| {
                AppError::Journal(format!(
                    "failed to create log directory {}: {e}",
                    logs_dir.display()
                ))
            })?;
        }
        Ok(Self {
            logs_dir,
            dry_run,
            lock: Mutex::new(()),
        })
    }

    /// Path of the day file for `date`.
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.logs_dir.join(format!("{date}.json"))
    }

    /// Read every entry recorded on `date`.
    ///
    /// Entries are returned as raw JSON so records written by other tools
    /// with unknown event types remain readable. A missing day file yields
    /// an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Journal`] if the file exists but is unreadable or
    /// not a JSON array.
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<Value>> {
        let path = self.path_for(date);
        Ok(read_array(&path)?.unwrap_or_default())
    }

    fn quarantine(path: &Path) {
        let aside = path.with_extension(format!("corrupt-{}.json", Utc::now().format("%H%M%S")));
        match fs::rename(path, &aside) {
            Ok(()) => warn!(
                path = %path.display(),
                aside = %aside.display(),
                "journal day file was not a JSON array; moved aside"
            ),
            Err(err) => warn!(path = %path.display(), %err, "failed to move corrupt journal aside"),
        }
    }
}

impl Journal for DailyJsonJournal {
    fn record(&self, entry: JournalEntry) -> Result<()> {
        if self.dry_run {
            debug!(
                event_type = ?entry.event_type,
                actor = %entry.actor,
                "dry run: journal entry not written"
            );
            return Ok(());
        }

        let _guard = self
            .lock
            .lock()
            .map_err(|_| AppError::Journal("journal mutex poisoned".to_string()))?;

        let path = self.path_for(entry.timestamp.date_naive());
        let mut entries = match read_array(&path) {
            Ok(existing) => existing.unwrap_or_default(),
            Err(err) => {
                warn!(%err, "unreadable journal day file; starting a new one");
                Self::quarantine(&path);
                Vec::new()
            }
        };

        let value = serde_json::to_value(&entry)
            .map_err(|e| AppError::Journal(format!("failed to serialize journal entry: {e}")))?;
        entries.push(value);

        let rendered = serde_json::to_string_pretty(&entries)
            .map_err(|e| AppError::Journal(format!("failed to serialize journal: {e}")))?;

        let mut tmp = NamedTempFile::new_in(&self.logs_dir)
            .map_err(|e| AppError::Journal(format!("failed to create temporary file: {e}")))?;
        tmp.write_all(rendered.as_bytes())
            .map_err(|e| AppError::Journal(format!("failed to write temporary file: {e}")))?;
        tmp.persist(&path).map_err(|e| {
            AppError::Journal(format!("failed to persist {}: {e}", path.display()))
        })?;

        Ok(())
    }
}

fn read_array(path: &Path) -> Result<Option<Vec<Value>>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(AppError::Journal(format!(
                "failed to read {}: {err}",
                path.display()
            )))
        }
    };
    if raw.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }
    serde_json::from_str::<Vec<Value>>(&raw)
        .map(Some)
        .map_err(|e| AppError::Journal(format!("{} is not a JSON array: {e}", path.display())))
}
