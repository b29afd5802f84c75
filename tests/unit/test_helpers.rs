//! Shared fixtures for unit tests.

#![allow(dead_code)]

use std::fs;
use std::sync::{Arc, Mutex};

use agent_vault::journal::{EventType, Journal, JournalEntry};
use agent_vault::store::{Stage, TaskStore};
use tempfile::TempDir;

/// Journal that keeps entries in memory.
#[derive(Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl MemoryJournal {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl Journal for MemoryJournal {
    fn record(&self, entry: JournalEntry) -> agent_vault::Result<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Empty vault with the standard layout and `local`/`cloud` claim dirs.
pub fn vault() -> (TempDir, TaskStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = TaskStore::new(dir.path().to_path_buf(), false);
    store.ensure_layout(&["local", "cloud"]).expect("layout");
    (dir, store)
}

/// Write raw task text into `stage`.
pub fn put(store: &TaskStore, stage: &Stage, name: &str, text: &str) {
    let path = store.path_of(stage, name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}
