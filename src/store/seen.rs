//! Bounded, persisted set of already-processed external event IDs.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::PathBuf;

use tracing::warn;

use super::write_atomic;
use crate::{AppError, Result};

/// Remembers the most recent `limit` event IDs of one watcher.
///
/// Persisted as a flat JSON list, oldest first. Used for events with no
/// move-based dedup, such as read-only notifications.
///
/// For sources that list every pending event on each poll,
/// [`SeenIds::retain_live`] drops ids whose event is gone and lifts the
/// bound to the number of live events, so a live id is never evicted.
#[derive(Debug)]
pub struct SeenIds {
    path: PathBuf,
    limit: usize,
    live: usize,
    order: VecDeque<String>,
    index: HashSet<String>,
    dry_run: bool,
}

impl SeenIds {
    /// Load the set from `path`. A missing or unreadable file starts empty.
    ///
    /// Every persisted id is kept; the limit applies from the next insert.
    #[must_use]
    pub fn load(path: PathBuf, limit: usize, dry_run: bool) -> Self {
        let ids: Vec<String> = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(path = %path.display(), %err, "seen-id file unreadable, starting empty");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        let mut seen = Self {
            path,
            limit: limit.max(1),
            live: 0,
            order: VecDeque::new(),
            index: HashSet::new(),
            dry_run,
        };
        for id in ids {
            if seen.index.insert(id.clone()) {
                seen.order.push_back(id);
            }
        }
        seen
    }

    /// Forget every id not in `live` and keep all of `live` retainable.
    ///
    /// Returns `true` if any id was forgotten.
    pub fn retain_live(&mut self, live: &HashSet<String>) -> bool {
        let before = self.order.len();
        self.order.retain(|id| live.contains(id));
        self.index.retain(|id| live.contains(id));
        self.live = live.len();
        self.order.len() != before
    }

    /// Whether `id` has been seen.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Remember `id`, evicting the oldest entry past the limit.
    ///
    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, id: String) -> bool {
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.order.push_back(id);
        while self.order.len() > self.limit.max(self.live) {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
            }
        }
        true
    }

    /// Number of remembered ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no ids are remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Persist the set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let ids: Vec<&String> = self.order.iter().collect();
        let raw = serde_json::to_string(&ids)
            .map_err(|err| AppError::Io(format!("failed to serialize seen ids: {err}")))?;
        write_atomic(&self.path, &raw)
    }
}
