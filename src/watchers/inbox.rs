//! Inbox file-drop source.

use std::fs;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use chrono::Utc;

use super::{EventSource, PollFuture};
use crate::store::{naming, Header, TaskFile};
use crate::{AppError, Result};

/// A file sitting in `Inbox`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxFile {
    /// Filename.
    pub name: String,
    /// Absolute path.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, seconds since the epoch.
    pub modified: u64,
}

/// Turns files dropped into `Inbox` into `FILE_*` tasks.
#[derive(Debug, Clone)]
pub struct InboxWatcher {
    dir: PathBuf,
}

impl InboxWatcher {
    /// Watch `dir`.
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn scan(&self) -> Result<Vec<InboxFile>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::Io(format!("failed to read {}: {err}", self.dir.display())))
            }
        };
        let mut files = Vec::new();
        for entry in entries.filter_map(std::result::Result::ok) {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs());
            files.push(InboxFile {
                name,
                path: entry.path(),
                size: meta.len(),
                modified,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

/// `P0`..`P3` from keywords in a filename.
#[must_use]
pub fn priority_for(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has(&["urgent", "asap"]) {
        "P0"
    } else if has(&["important", "invoice", "payment", "contract"]) {
        "P1"
    } else if has(&["review", "report"]) {
        "P2"
    } else {
        "P3"
    }
}

impl EventSource for InboxWatcher {
    type Event = InboxFile;

    fn name(&self) -> &str {
        "inbox"
    }

    fn poll(&mut self) -> PollFuture<'_, InboxFile> {
        Box::pin(async move { self.scan() })
    }

    fn event_id(&self, event: &InboxFile) -> String {
        format!("{}:{}:{}", event.name, event.size, event.modified)
    }

    fn lists_all_pending(&self) -> bool {
        true
    }

    fn materialize(&self, event: &InboxFile) -> Result<(String, TaskFile)> {
        let priority = priority_for(&event.name);
        let header = Header::new()
            .with("type", "file_drop")
            .with("original_name", event.name.as_str())
            .with("original_path", event.path.display().to_string())
            .with("size", event.size.to_string())
            .with("priority", priority)
            .with("received", Utc::now().to_rfc3339())
            .with("status", "pending");
        let body = format!(
            "\n# File Drop: {}\n\nA file was dropped into the inbox ({} bytes, priority {priority}).\n\n## Suggested Actions\n\n- Review the file\n- Move it to its project folder\n- Archive this task when done\n",
            event.name, event.size
        );
        let name = naming::task_name("FILE", &self.event_id(event));
        Ok((name, TaskFile::new(header, body)))
    }
}
