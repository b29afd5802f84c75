//! Claim protocol: lock-free task acquisition by rename.
//!
//! An agent claims a task by renaming it from `Needs_Action` into
//! `In_Progress/<agent>`. The rename is the only mutual-exclusion mechanism;
//! losing a race is a normal outcome, never an error.

pub mod work_zone;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::journal::{EventType, Journal, JournalEntry};
use crate::store::{RenameOutcome, Stage, TaskStore};
use crate::{AppError, Result};

pub use work_zone::WorkZone;

/// Why a claim attempt did not take the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotClaimed {
    /// A same-named file already sits in this agent's or another agent's
    /// `In_Progress` directory.
    HeldBy(String),
    /// The rename found its destination occupied.
    DestinationExists,
    /// The source vanished; another agent got it first.
    SourceMissing,
}

/// A task currently held by this agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedTask {
    /// Task filename.
    pub name: String,
    /// Claiming agent.
    pub agent: String,
    /// Where the file can be read now.
    pub path: PathBuf,
}

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This agent now owns the task.
    Claimed(ClaimedTask),
    /// Someone else has it, or it is gone.
    NotClaimed(NotClaimed),
}

impl ClaimOutcome {
    /// Whether the claim succeeded.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed(_))
    }
}

/// Result of releasing a task back to `Needs_Action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The file moved back to `Needs_Action`.
    Released,
    /// The file was already back in `Needs_Action`.
    AlreadyReleased,
    /// `Needs_Action` already holds a different file of the same name; the
    /// claimed copy stays where it is.
    Conflict,
}

/// Claim, release and completion for one named agent.
#[derive(Clone)]
pub struct ClaimProtocol {
    store: TaskStore,
    agent: String,
    journal: Arc<dyn Journal>,
}

impl ClaimProtocol {
    /// Protocol handle for `agent` over `store`.
    #[must_use]
    pub fn new(store: TaskStore, agent: impl Into<String>, journal: Arc<dyn Journal>) -> Self {
        Self {
            store,
            agent: agent.into(),
            journal,
        }
    }

    /// Name of the claiming agent.
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    fn own_stage(&self) -> Stage {
        Stage::InProgress(self.agent.clone())
    }

    /// Agent currently holding `name` in any `In_Progress` directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if `In_Progress` cannot be enumerated.
    pub fn held_by(&self, name: &str) -> Result<Option<String>> {
        Ok(self.store.claim_agents()?.into_iter().find(|agent| {
            self.store
                .path_of(&Stage::InProgress(agent.clone()), name)
                .exists()
        }))
    }

    /// Try to take `name` from `Needs_Action`.
    ///
    /// Every `In_Progress/*` directory is scanned first and the attempt is
    /// skipped if any holds the name. The rename decides the race.
    ///
    /// # Errors
    ///
    /// Returns an error only for filesystem failures other than losing the
    /// race.
    pub fn claim(&self, name: &str) -> Result<ClaimOutcome> {
        if let Some(holder) = self.held_by(name)? {
            debug!(file = name, holder, "task already held, skipping claim");
            return Ok(ClaimOutcome::NotClaimed(NotClaimed::HeldBy(holder)));
        }

        let source = self.store.path_of(&Stage::NeedsAction, name);
        if self.store.dry_run() {
            if !source.is_file() {
                return Ok(ClaimOutcome::NotClaimed(NotClaimed::SourceMissing));
            }
            info!(file = name, agent = self.agent, "dry run: would claim task");
            return Ok(ClaimOutcome::Claimed(ClaimedTask {
                name: name.to_owned(),
                agent: self.agent.clone(),
                path: source,
            }));
        }

        let dest = self.store.path_of(&self.own_stage(), name);
        match self.store.renamer().rename_exclusive(&source, &dest)? {
            RenameOutcome::Moved => {
                info!(file = name, agent = self.agent, "task claimed");
                self.journal.record_or_warn(
                    JournalEntry::new(EventType::TaskClaimed, &self.agent)
                        .with_file(name)
                        .with_agent(&self.agent),
                );
                Ok(ClaimOutcome::Claimed(ClaimedTask {
                    name: name.to_owned(),
                    agent: self.agent.clone(),
                    path: dest,
                }))
            }
            RenameOutcome::DestinationExists => {
                debug!(file = name, "claim destination occupied");
                Ok(ClaimOutcome::NotClaimed(NotClaimed::DestinationExists))
            }
            RenameOutcome::SourceMissing => {
                debug!(file = name, "task taken by another agent");
                Ok(ClaimOutcome::NotClaimed(NotClaimed::SourceMissing))
            }
        }
    }

    /// Move a claimed task back to `Needs_Action`, recording `reason`.
    ///
    /// Releasing twice is harmless: the second call reports
    /// [`ReleaseOutcome::AlreadyReleased`] and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is neither claimed by this
    /// agent nor back in `Needs_Action`.
    pub fn release(&self, task: &ClaimedTask, reason: &str) -> Result<ReleaseOutcome> {
        let claimed = self.store.path_of(&self.own_stage(), &task.name);
        let pending = self.store.path_of(&Stage::NeedsAction, &task.name);

        if self.store.dry_run() {
            info!(file = task.name, reason, "dry run: would release task");
            return Ok(ReleaseOutcome::Released);
        }

        match self.store.renamer().rename_exclusive(&claimed, &pending)? {
            RenameOutcome::Moved => {
                info!(file = task.name, agent = self.agent, reason, "task released");
                self.journal.record_or_warn(
                    JournalEntry::new(EventType::TaskReleased, &self.agent)
                        .with_file(&task.name)
                        .with_agent(&self.agent)
                        .with_reason(reason),
                );
                Ok(ReleaseOutcome::Released)
            }
            RenameOutcome::DestinationExists if !claimed.exists() => {
                Ok(ReleaseOutcome::AlreadyReleased)
            }
            RenameOutcome::DestinationExists => {
                warn!(
                    file = task.name,
                    "release target occupied by another file; keeping claimed copy"
                );
                Ok(ReleaseOutcome::Conflict)
            }
            RenameOutcome::SourceMissing if pending.exists() => Ok(ReleaseOutcome::AlreadyReleased),
            RenameOutcome::SourceMissing => Err(AppError::NotFound(format!(
                "{} is not claimed by {}",
                task.name, self.agent
            ))),
        }
    }

    /// Archive a claimed task to `Done`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task is no longer claimed.
    pub fn complete(&self, task: &ClaimedTask) -> Result<PathBuf> {
        self.store
            .move_task(&task.name, &self.own_stage(), &Stage::Done)
    }
}
