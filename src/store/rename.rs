//! Rename-or-fail primitive used for every Task Store transition.
//!
//! The claim protocol relies on exactly one caller winning a rename of the
//! same source. [`FsRename`] gets that from the filesystem: `link(2)` never
//! replaces an existing name, and only one unlink of the source succeeds.
//! Callers only see [`ExclusiveRename`], so a lock-service backed
//! implementation can be swapped in without changing them.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

use crate::{AppError, Result};

/// Result of an exclusive rename attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    /// The file now lives at the destination.
    Moved,
    /// Something already occupies the destination; nothing was changed.
    DestinationExists,
    /// The source was gone, typically taken by another agent.
    SourceMissing,
}

/// Atomic move that never overwrites its destination.
pub trait ExclusiveRename: Send + Sync {
    /// Move `from` to `to`, creating the destination directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures other than the two race outcomes,
    /// which are reported through [`RenameOutcome`].
    fn rename_exclusive(&self, from: &Path, to: &Path) -> Result<RenameOutcome>;
}

/// [`ExclusiveRename`] over hard links.
///
/// `link(2)` fails with `EEXIST` rather than replacing an occupied
/// destination, so the no-overwrite check and the move are one step. The
/// source is unlinked afterwards; when two agents link the same source,
/// only one unlink succeeds and the loser removes its own link again.
/// Filesystems without hard links fall back to a checked `fs::rename`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRename;

impl ExclusiveRename for FsRename {
    fn rename_exclusive(&self, from: &Path, to: &Path) -> Result<RenameOutcome> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::Io(format!("failed to create {}: {err}", parent.display()))
            })?;
        }
        match fs::hard_link(from, to) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Ok(RenameOutcome::DestinationExists);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(RenameOutcome::SourceMissing);
            }
            Err(err) => {
                debug!(%err, "hard link unavailable, using checked rename");
                return checked_rename(from, to);
            }
        }
        match fs::remove_file(from) {
            Ok(()) => Ok(RenameOutcome::Moved),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::remove_file(to).map_err(|err| move_error(from, to, &err))?;
                Ok(RenameOutcome::SourceMissing)
            }
            Err(err) => {
                // The source stays authoritative; the link is a duplicate.
                if let Err(cleanup) = fs::remove_file(to) {
                    warn!(path = %to.display(), %cleanup, "cannot remove duplicate link");
                }
                Err(move_error(from, to, &err))
            }
        }
    }
}

/// Destination check followed by `fs::rename`. A file created at the
/// destination between the two steps can be replaced.
fn checked_rename(from: &Path, to: &Path) -> Result<RenameOutcome> {
    if fs::symlink_metadata(to).is_ok() {
        return Ok(RenameOutcome::DestinationExists);
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(RenameOutcome::Moved),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RenameOutcome::SourceMissing),
        Err(err) => Err(move_error(from, to, &err)),
    }
}

fn move_error(from: &Path, to: &Path, err: &std::io::Error) -> AppError {
    AppError::Io(format!(
        "failed to move {} to {}: {err}",
        from.display(),
        to.display()
    ))
}
