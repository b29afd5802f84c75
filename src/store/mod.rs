//! Task Store: directory-per-stage work queue.
//!
//! The directory a task file resides in is its authoritative state. Every
//! transition is a move through [`ExclusiveRename`]; the header `status`
//! field is advisory and only rewritten for error annotations.

pub mod naming;
pub mod rename;
pub mod seen;
pub mod task_file;

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use glob::Pattern;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{AppError, Result};

pub use rename::{ExclusiveRename, FsRename, RenameOutcome};
pub use seen::SeenIds;
pub use task_file::{Header, TaskFile};

/// Directory holding unclaimed work.
pub const NEEDS_ACTION: &str = "Needs_Action";
/// Parent of the per-agent claim directories.
pub const IN_PROGRESS: &str = "In_Progress";
/// Drafts awaiting human sign-off.
pub const PENDING_APPROVAL: &str = "Pending_Approval";
/// Human-approved drafts.
pub const APPROVED: &str = "Approved";
/// Human-rejected drafts.
pub const REJECTED: &str = "Rejected";
/// Terminal archive.
pub const DONE: &str = "Done";
/// Inter-agent status files.
pub const SIGNALS: &str = "Signals";
/// Daily event journals.
pub const LOGS: &str = "Logs";
/// Generated reports.
pub const BRIEFINGS: &str = "Briefings";
/// Human file-drop folder watched by the inbox watcher.
pub const INBOX: &str = "Inbox";

/// Bounded attempts at finding a free collision name.
const MAX_COLLISION_ATTEMPTS: u32 = 100;

/// A lifecycle stage; one directory of the Task Store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Newly detected, unclaimed.
    NeedsAction,
    /// Claimed by the named agent.
    InProgress(String),
    /// Drafted, awaiting human sign-off.
    PendingApproval,
    /// Human approved.
    Approved,
    /// Human rejected.
    Rejected,
    /// Terminal.
    Done,
}

impl Stage {
    /// Path of the stage directory relative to the store root.
    #[must_use]
    pub fn relative_dir(&self) -> PathBuf {
        match self {
            Self::NeedsAction => PathBuf::from(NEEDS_ACTION),
            Self::InProgress(agent) => Path::new(IN_PROGRESS).join(agent),
            Self::PendingApproval => PathBuf::from(PENDING_APPROVAL),
            Self::Approved => PathBuf::from(APPROVED),
            Self::Rejected => PathBuf::from(REJECTED),
            Self::Done => PathBuf::from(DONE),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress(agent) => write!(f, "{IN_PROGRESS}/{agent}"),
            other => write!(f, "{}", other.relative_dir().display()),
        }
    }
}

/// Handle on a Task Store rooted at one vault directory.
#[derive(Clone)]
pub struct TaskStore {
    root: PathBuf,
    dry_run: bool,
    renamer: Arc<dyn ExclusiveRename>,
}

impl fmt::Debug for TaskStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStore")
            .field("root", &self.root)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl TaskStore {
    /// Store over `root` using filesystem renames.
    #[must_use]
    pub fn new(root: PathBuf, dry_run: bool) -> Self {
        Self::with_renamer(root, dry_run, Arc::new(FsRename))
    }

    /// Store over `root` using a custom rename primitive.
    #[must_use]
    pub fn with_renamer(root: PathBuf, dry_run: bool, renamer: Arc<dyn ExclusiveRename>) -> Self {
        Self {
            root,
            dry_run,
            renamer,
        }
    }

    /// Vault root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether mutations are suppressed.
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Rename primitive shared by every transition.
    #[must_use]
    pub fn renamer(&self) -> &dyn ExclusiveRename {
        self.renamer.as_ref()
    }

    /// Absolute directory of `stage`.
    #[must_use]
    pub fn stage_dir(&self, stage: &Stage) -> PathBuf {
        self.root.join(stage.relative_dir())
    }

    /// Absolute path of `name` within `stage`.
    #[must_use]
    pub fn path_of(&self, stage: &Stage, name: &str) -> PathBuf {
        self.stage_dir(stage).join(name)
    }

    /// `Signals` directory.
    #[must_use]
    pub fn signals_dir(&self) -> PathBuf {
        self.root.join(SIGNALS)
    }

    /// `Logs` directory.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS)
    }

    /// `Briefings` directory.
    #[must_use]
    pub fn briefings_dir(&self) -> PathBuf {
        self.root.join(BRIEFINGS)
    }

    /// `Inbox` directory.
    #[must_use]
    pub fn inbox_dir(&self) -> PathBuf {
        self.root.join(INBOX)
    }

    /// Create every stage directory, the claim directories of `agents`,
    /// and the non-task directories.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if a directory cannot be created.
    pub fn ensure_layout(&self, agents: &[&str]) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let mut dirs = vec![
            self.stage_dir(&Stage::NeedsAction),
            self.root.join(IN_PROGRESS),
            self.stage_dir(&Stage::PendingApproval),
            self.stage_dir(&Stage::Approved),
            self.stage_dir(&Stage::Rejected),
            self.stage_dir(&Stage::Done),
            self.signals_dir(),
            self.logs_dir(),
            self.briefings_dir(),
            self.inbox_dir(),
        ];
        dirs.extend(
            agents
                .iter()
                .map(|agent| self.stage_dir(&Stage::InProgress((*agent).to_owned()))),
        );
        for dir in dirs {
            fs::create_dir_all(&dir)
                .map_err(|err| AppError::Io(format!("failed to create {}: {err}", dir.display())))?;
        }
        Ok(())
    }

    /// Write a new task file. Never replaces an existing file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory is unwritable or `name`
    /// already exists in `stage`.
    pub fn create(&self, stage: &Stage, name: &str, task: &TaskFile) -> Result<PathBuf> {
        let dir = self.stage_dir(stage);
        let path = dir.join(name);
        if self.dry_run {
            info!(file = name, stage = %stage, "dry run: would create task file");
            return Ok(path);
        }
        fs::create_dir_all(&dir)
            .map_err(|err| AppError::Io(format!("failed to create {}: {err}", dir.display())))?;
        let mut tmp = NamedTempFile::new_in(&dir)
            .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
        tmp.write_all(task.render().as_bytes())
            .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
        tmp.persist_noclobber(&path).map_err(|err| {
            AppError::Io(format!("failed to create {}: {}", path.display(), err.error))
        })?;
        debug!(file = name, stage = %stage, "task file created");
        Ok(path)
    }

    /// Task filenames in `stage` matching the glob `pattern`, sorted.
    ///
    /// Hidden files, `.gitkeep` and directories are skipped. A missing stage
    /// directory lists as empty. The result is a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an invalid pattern, `AppError::Io` if
    /// the directory exists but cannot be read.
    pub fn list(&self, stage: &Stage, pattern: &str) -> Result<Vec<String>> {
        list_dir(&self.stage_dir(stage), pattern)
    }

    /// Agent names that currently have an `In_Progress` directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if `In_Progress` exists but cannot be read.
    pub fn claim_agents(&self) -> Result<Vec<String>> {
        let dir = self.root.join(IN_PROGRESS);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::Io(format!("failed to read {}: {err}", dir.display())))
            }
        };
        let mut agents: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        agents.sort();
        Ok(agents)
    }

    /// Every stage currently holding a file called `name`.
    ///
    /// Under normal operation this has at most one element.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if `In_Progress` cannot be enumerated.
    pub fn locate(&self, name: &str) -> Result<Vec<Stage>> {
        let mut stages = vec![
            Stage::NeedsAction,
            Stage::PendingApproval,
            Stage::Approved,
            Stage::Rejected,
            Stage::Done,
        ];
        stages.extend(self.claim_agents()?.into_iter().map(Stage::InProgress));
        Ok(stages
            .into_iter()
            .filter(|stage| self.path_of(stage, name).is_file())
            .collect())
    }

    /// Parse the task file `name` in `stage`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the file is absent, `AppError::Data`
    /// if it is not UTF-8.
    pub fn read(&self, stage: &Stage, name: &str) -> Result<TaskFile> {
        read_task(&self.path_of(stage, name))
    }

    /// Move `name` between stages, keeping its name when free.
    ///
    /// When the destination already has a same-named file the moved file is
    /// renamed with a time suffix instead of overwriting. Returns the final
    /// path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the source is gone, `AppError::Io` on
    /// other filesystem failures.
    pub fn move_task(&self, name: &str, from: &Stage, to: &Stage) -> Result<PathBuf> {
        self.move_as(name, from, to, name)
    }

    /// Move `name` between stages under `dest_name`, with the same collision
    /// policy as [`TaskStore::move_task`].
    ///
    /// # Errors
    ///
    /// Same as [`TaskStore::move_task`].
    pub fn move_as(
        &self,
        name: &str,
        from: &Stage,
        to: &Stage,
        dest_name: &str,
    ) -> Result<PathBuf> {
        let source = self.path_of(from, name);
        if self.dry_run {
            info!(file = name, from = %from, to = %to, "dry run: would move task file");
            return Ok(self.path_of(to, dest_name));
        }
        let dest = self.rename_with_suffix(&source, to, dest_name)?;
        debug!(file = name, from = %from, to = %to, "task file moved");
        Ok(dest)
    }

    /// Archive a file that lives outside the stage directories (a signal,
    /// say) into `Done` under `dest_name`.
    ///
    /// # Errors
    ///
    /// Same as [`TaskStore::move_task`].
    pub fn archive_path(&self, source: &Path, dest_name: &str) -> Result<PathBuf> {
        if self.dry_run {
            info!(path = %source.display(), "dry run: would archive file");
            return Ok(self.path_of(&Stage::Done, dest_name));
        }
        self.rename_with_suffix(source, &Stage::Done, dest_name)
    }

    fn rename_with_suffix(&self, source: &Path, to: &Stage, dest_name: &str) -> Result<PathBuf> {
        let now = Utc::now();
        let mut dest = self.path_of(to, dest_name);
        let mut attempt = 0;
        loop {
            match self.renamer.rename_exclusive(source, &dest)? {
                RenameOutcome::Moved => return Ok(dest),
                RenameOutcome::SourceMissing => {
                    return Err(AppError::NotFound(format!(
                        "{} no longer exists",
                        source.display()
                    )));
                }
                RenameOutcome::DestinationExists => {
                    attempt += 1;
                    if attempt > MAX_COLLISION_ATTEMPTS {
                        return Err(AppError::Io(format!(
                            "no free archive name for {dest_name} in {to}"
                        )));
                    }
                    dest = self.path_of(to, &naming::collision_name(dest_name, now, attempt));
                }
            }
        }
    }

    /// Rewrite the advisory `status` header of `name` in place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the file is absent, `AppError::Io` if
    /// it cannot be rewritten.
    pub fn set_status(&self, stage: &Stage, name: &str, status: &str) -> Result<()> {
        let path = self.path_of(stage, name);
        let mut task = read_task(&path)?;
        task.header.set("status", status);
        if self.dry_run {
            info!(file = name, status, "dry run: would update status");
            return Ok(());
        }
        write_atomic(&path, &task.render())
    }

    /// Write a non-task file (signal, dashboard, briefing) under the root.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` on write failure.
    pub fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        if self.dry_run {
            info!(path = %path.display(), "dry run: would write file");
            return Ok(());
        }
        write_atomic(path, contents)
    }
}

/// Parse a task file at an absolute path.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the file is absent, `AppError::Data` if
/// it is not UTF-8, `AppError::Io` otherwise.
pub fn read_task(path: &Path) -> Result<TaskFile> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(TaskFile::parse(&text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::NotFound(path.display().to_string()))
        }
        Err(err) if err.kind() == std::io::ErrorKind::InvalidData => Err(AppError::Data(format!(
            "{} is not valid UTF-8",
            path.display()
        ))),
        Err(err) => Err(AppError::Io(format!("failed to read {}: {err}", path.display()))),
    }
}

/// Replace `path` with `contents` through a temporary file in the same
/// directory.
///
/// # Errors
///
/// Returns `AppError::Io` on any filesystem failure.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::Io(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)
        .map_err(|err| AppError::Io(format!("failed to create {}: {err}", parent.display())))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Io(format!("failed to create temporary file: {err}")))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|err| AppError::Io(format!("failed to write temporary file: {err}")))?;
    tmp.persist(path)
        .map_err(|err| AppError::Io(format!("failed to persist {}: {err}", path.display())))?;
    Ok(())
}

/// Sorted file names in `dir` matching `pattern`.
///
/// # Errors
///
/// Returns `AppError::Config` for an invalid pattern, `AppError::Io` if the
/// directory exists but cannot be read.
pub fn list_dir(dir: &Path, pattern: &str) -> Result<Vec<String>> {
    let matcher = Pattern::new(pattern)
        .map_err(|err| AppError::Config(format!("invalid pattern '{pattern}': {err}")))?;
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(AppError::Io(format!("failed to read {}: {err}", dir.display()))),
    };
    let mut names: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.') && name != ".gitkeep")
        .filter(|name| matcher.matches(name))
        .collect();
    names.sort();
    Ok(names)
}
