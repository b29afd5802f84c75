//! Folder watcher for human decisions.
//!
//! Watches `Approved` and `Rejected` with `notify` and forwards the names
//! of created or moved-in task files over a channel. The periodic
//! approved sweep covers anything the watcher misses.

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::store::{Stage, TaskStore};
use crate::{AppError, Result};

/// A task file appeared in a decision folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionEvent {
    /// `Approved` or `Rejected`.
    pub stage: Stage,
    /// Task filename.
    pub name: String,
}

/// Keeps the underlying watcher alive; events stop when dropped.
pub struct ApprovedWatcher {
    _watcher: RecommendedWatcher,
}

impl ApprovedWatcher {
    /// Start watching the store's decision folders.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the watcher cannot be created or a folder
    /// cannot be watched.
    pub fn start(store: &TaskStore, tx: mpsc::Sender<DecisionEvent>) -> Result<Self> {
        let approved = store.stage_dir(&Stage::Approved);
        let rejected = store.stage_dir(&Stage::Rejected);
        let dirs = (approved.clone(), rejected.clone());

        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if !is_arrival(&event.kind) {
                        return;
                    }
                    for path in &event.paths {
                        let Some(decision) = decision_for(path, &dirs) else {
                            continue;
                        };
                        debug!(
                            file = decision.name,
                            stage = %decision.stage,
                            "decision file arrived"
                        );
                        if tx.blocking_send(decision).is_err() {
                            return;
                        }
                    }
                }
                Err(err) => warn!(%err, "decision folder watcher error"),
            },
        )
        .map_err(|err| AppError::Io(format!("failed to create watcher: {err}")))?;

        for dir in [&approved, &rejected] {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|err| {
                    AppError::Io(format!("failed to watch {}: {err}", dir.display()))
                })?;
        }
        info!(
            approved = %approved.display(),
            rejected = %rejected.display(),
            "watching decision folders"
        );
        Ok(Self { _watcher: watcher })
    }
}

fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Any | RenameMode::Both
            ))
    )
}

fn decision_for(path: &Path, (approved, rejected): &(PathBuf, PathBuf)) -> Option<DecisionEvent> {
    let parent = path.parent()?;
    let stage = if parent == approved {
        Stage::Approved
    } else if parent == rejected {
        Stage::Rejected
    } else {
        return None;
    };
    let name = path.file_name()?.to_str()?.to_owned();
    let visible = !name.starts_with('.')
        && Path::new(&name)
            .extension()
            .is_some_and(|ext| ext == "md");
    visible.then_some(DecisionEvent { stage, name })
}
