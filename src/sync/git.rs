//! Thin async wrapper over the `git` CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::{AppError, Result};

/// Captured result of one git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    /// Exit code, `None` if killed by a signal.
    pub code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl GitOutput {
    /// Whether git exited 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Non-empty stdout lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Runs git in one working tree with a per-command timeout.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    timeout: Duration,
    dry_run: bool,
}

impl Git {
    /// Runner for the repository containing `workdir`.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration, dry_run: bool) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
            dry_run,
        }
    }

    /// Working directory.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run a read-only command and return its output whatever the exit code.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sync` if git cannot be spawned,
    /// `AppError::Transient` on timeout.
    pub async fn query(&self, args: &[&str]) -> Result<GitOutput> {
        self.exec(args).await
    }

    /// Run a read-only command that must succeed.
    ///
    /// # Errors
    ///
    /// As [`Git::query`], plus a classified error on non-zero exit.
    pub async fn read(&self, args: &[&str]) -> Result<GitOutput> {
        let out = self.exec(args).await?;
        if out.success() {
            Ok(out)
        } else {
            Err(classify_failure(args, &out))
        }
    }

    /// Run a command that changes the repository or the remote.
    ///
    /// In dry-run mode nothing runs and an empty success is returned.
    ///
    /// # Errors
    ///
    /// As [`Git::read`].
    pub async fn write(&self, args: &[&str]) -> Result<GitOutput> {
        if self.dry_run {
            info!(args = ?args, "dry run: would run git");
            return Ok(GitOutput {
                code: Some(0),
                ..GitOutput::default()
            });
        }
        self.read(args).await
    }

    /// Like [`Git::write`] but returns the output on non-zero exit.
    ///
    /// # Errors
    ///
    /// As [`Git::query`].
    pub async fn write_unchecked(&self, args: &[&str]) -> Result<GitOutput> {
        if self.dry_run {
            info!(args = ?args, "dry run: would run git");
            return Ok(GitOutput {
                code: Some(0),
                ..GitOutput::default()
            });
        }
        self.exec(args).await
    }

    async fn exec(&self, args: &[&str]) -> Result<GitOutput> {
        debug!(args = ?args, "git");
        let child = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AppError::Sync(format!("failed to spawn git: {err}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::Transient(format!(
                    "git {} timed out after {}s",
                    args.first().unwrap_or(&""),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|err| AppError::Sync(format!("git wait failed: {err}")))?;

        Ok(GitOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

const TRANSIENT_MARKERS: &[&str] = &[
    "could not resolve host",
    "connection timed out",
    "connection refused",
    "connection reset",
    "unable to access",
    "could not read from remote repository",
    "the remote end hung up",
    "operation timed out",
    "temporary failure",
];

const AUTH_MARKERS: &[&str] = &[
    "authentication failed",
    "permission denied",
    "invalid username or password",
];

fn classify_failure(args: &[&str], out: &GitOutput) -> AppError {
    let stderr = out.stderr.trim();
    let lower = stderr.to_ascii_lowercase();
    let message = format!("git {} failed ({:?}): {stderr}", args.join(" "), out.code);
    if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
        AppError::Auth(message)
    } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        AppError::Transient(message)
    } else {
        AppError::Sync(message)
    }
}
