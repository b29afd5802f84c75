//! Git replication of the vault between machines.
//!
//! `pull` fetches and merges with the directory-scoped conflict policy in
//! [`policy`]; `push` stages the vault minus excluded secrets, commits and
//! pushes. Each operation updates the rolling `Signals/SYNC_STATUS.md`.
//! A missing repository or remote is logged and skipped, never an error.

pub mod git;
pub mod policy;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::journal::{EventType, Journal, JournalEntry};
use crate::resilience::{retry, RetryPolicy};
use crate::signals::{SignalWriter, SYNC_STATUS};
use crate::store::TaskStore;
use crate::{AppError, Result};

pub use git::{Git, GitOutput};
pub use policy::{side_for, ConflictSide};

/// What a sync operation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Files changed by the merge or included in the commit.
    pub changed: usize,
    /// Conflicted paths resolved by policy.
    pub conflicts_resolved: usize,
    /// Commits pushed to the remote.
    pub pushed: bool,
    /// Why the operation was skipped, if it was.
    pub skipped: Option<String>,
}

impl SyncReport {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Replication for one vault working tree.
pub struct VaultSync {
    git: Git,
    journal: Arc<dyn Journal>,
    signals: SignalWriter,
    agent: String,
    remote: String,
    branch: String,
    exclude: Vec<String>,
    retry: RetryPolicy,
    interval: Duration,
    dry_run: bool,
}

impl VaultSync {
    /// Replication configured from the `[sync]` and `[resilience]` sections.
    #[must_use]
    pub fn from_config(config: &GlobalConfig, store: TaskStore, journal: Arc<dyn Journal>) -> Self {
        let agent = config.agent_name();
        Self {
            git: Git::new(
                config.vault_root(),
                Duration::from_secs(config.sync.git_timeout_seconds),
                config.dry_run,
            ),
            journal,
            signals: SignalWriter::new(store, agent.clone()),
            agent,
            remote: config.sync.remote.clone(),
            branch: config.sync.branch.clone(),
            exclude: config.sync.exclude_patterns.clone(),
            retry: RetryPolicy::from_config(&config.resilience),
            interval: config.sync_interval(),
            dry_run: config.dry_run,
        }
    }

    fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    /// Reason to skip replication, if the tree is not ready for it.
    async fn precondition(&self) -> Result<Option<String>> {
        let inside = self.git.query(&["rev-parse", "--is-inside-work-tree"]).await?;
        if !inside.success() {
            return Ok(Some(format!(
                "{} is not a git working tree",
                self.git.workdir().display()
            )));
        }
        let remote = self.git.query(&["remote", "get-url", &self.remote]).await?;
        if !remote.success() {
            return Ok(Some(format!("remote '{}' is not configured", self.remote)));
        }
        Ok(None)
    }

    /// Commit local changes, then fetch and merge remote changes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transient` once fetch retries are exhausted,
    /// `AppError::Sync` if the merge fails for a reason other than
    /// resolvable conflicts.
    pub async fn pull(&self) -> Result<SyncReport> {
        let result = self.pull_inner().instrument(info_span!("sync_pull")).await;
        self.finish("pull", EventType::SyncPull, &result);
        result
    }

    async fn pull_inner(&self) -> Result<SyncReport> {
        if let Some(reason) = self.precondition().await? {
            info!(%reason, "replication skipped");
            return Ok(SyncReport::skipped(reason));
        }
        if self.dry_run {
            info!(remote = self.remote, branch = self.branch, "dry run: would fetch and merge");
            return Ok(SyncReport::skipped("dry run"));
        }

        self.commit_local(&default_commit_message()).await?;
        let fetch = ["fetch", self.remote.as_str(), self.branch.as_str()];
        retry(&self.retry, "git-fetch", || self.git.write(&fetch)).await?;

        let remote_ref = self.remote_ref();
        let has_head = self
            .git
            .query(&["rev-parse", "--verify", "--quiet", "HEAD"])
            .await?
            .success();
        if has_head {
            let incoming = self
                .git
                .read(&["rev-list", "--count", &format!("HEAD..{remote_ref}")])
                .await?;
            if incoming.stdout.trim() == "0" {
                debug!("already up to date");
                return Ok(SyncReport::default());
            }
        } else {
            self.git.write(&["merge", &remote_ref]).await?;
            let changed = self.git.read(&["ls-files"]).await?.lines().count();
            return Ok(SyncReport {
                changed,
                ..SyncReport::default()
            });
        }

        let before = self.git.read(&["rev-parse", "HEAD"]).await?.stdout.trim().to_owned();
        let merge = self
            .git
            .write_unchecked(&["merge", "--no-commit", "--no-ff", &remote_ref])
            .await?;

        let conflicted: Vec<String> = self
            .git
            .read(&["diff", "--name-only", "--relative", "--diff-filter=U"])
            .await?
            .lines()
            .map(str::to_owned)
            .collect();

        if !merge.success() && conflicted.is_empty() {
            self.abort_merge().await;
            return Err(AppError::Sync(format!(
                "merge of {remote_ref} failed: {}",
                merge.stderr.trim()
            )));
        }

        for path in &conflicted {
            self.resolve(path).await?;
        }

        let merging = self
            .git
            .query(&["rev-parse", "--verify", "--quiet", "MERGE_HEAD"])
            .await?
            .success();
        if merging {
            let message = if conflicted.is_empty() {
                format!("chore(vault-sync): merge {remote_ref}")
            } else {
                format!(
                    "chore(vault-sync): merge {remote_ref} ({} conflicts resolved)",
                    conflicted.len()
                )
            };
            self.git.write(&["commit", "--no-verify", "-m", &message]).await?;
        }

        let changed = self
            .git
            .read(&["diff", "--name-only", &before, "HEAD"])
            .await?
            .lines()
            .count();
        info!(changed, conflicts = conflicted.len(), "pulled remote changes");
        Ok(SyncReport {
            changed,
            conflicts_resolved: conflicted.len(),
            ..SyncReport::default()
        })
    }

    /// Back out of a half-applied merge. A merge refused before it started
    /// leaves no `MERGE_HEAD`, so there is nothing to abort.
    async fn abort_merge(&self) {
        let merging = match self
            .git
            .query(&["rev-parse", "--verify", "--quiet", "MERGE_HEAD"])
            .await
        {
            Ok(out) => out.success(),
            Err(err) => {
                warn!(%err, "cannot inspect merge state; repository may be left mid-merge");
                return;
            }
        };
        if !merging {
            return;
        }
        match self.git.write_unchecked(&["merge", "--abort"]).await {
            Ok(out) if out.success() => debug!("merge aborted"),
            Ok(out) => warn!(
                stderr = %out.stderr.trim(),
                "merge --abort failed; repository is left mid-merge"
            ),
            Err(err) => warn!(%err, "merge --abort failed; repository is left mid-merge"),
        }
    }

    /// Resolve one conflicted path with the directory policy.
    async fn resolve(&self, path: &str) -> Result<()> {
        let side = side_for(path);
        let checkout = self
            .git
            .write_unchecked(&["checkout", side.checkout_flag(), "--", path])
            .await?;
        if checkout.success() {
            self.git.write(&["add", "--", path]).await?;
        } else {
            // The winning side deleted the file.
            self.git.write(&["rm", "--quiet", "--", path]).await?;
        }
        info!(path, ?side, "conflict resolved by directory policy");
        Ok(())
    }

    /// Stage and commit local changes. Returns the number of files
    /// committed; zero means there was nothing to commit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sync` if staging or committing fails.
    pub async fn commit_local(&self, message: &str) -> Result<usize> {
        let mut args: Vec<String> = vec!["add".into(), "-A".into(), "--".into(), ".".into()];
        args.extend(self.exclude.iter().map(|p| format!(":(exclude,glob){p}")));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.git.write(&args).await?;

        let staged = self.git.read(&["diff", "--cached", "--name-only"]).await?.lines().count();
        if staged == 0 {
            debug!("nothing to commit");
            return Ok(0);
        }
        self.git.write(&["commit", "--no-verify", "-m", message]).await?;
        info!(files = staged, "committed local changes");
        Ok(staged)
    }

    async fn push_commits(&self) -> Result<bool> {
        let remote_ref = self.remote_ref();
        let ahead = self
            .git
            .query(&["rev-list", "--count", &format!("{remote_ref}..HEAD")])
            .await?;
        if ahead.success() && ahead.stdout.trim() == "0" {
            return Ok(false);
        }
        let refspec = format!("HEAD:{}", self.branch);
        let push = ["push", self.remote.as_str(), refspec.as_str()];
        retry(&self.retry, "git-push", || self.git.write(&push)).await?;
        info!(remote = self.remote, branch = self.branch, "pushed");
        Ok(true)
    }

    /// Commit local changes with `message` and push.
    ///
    /// Nothing to commit or push is a success.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transient` once push retries are exhausted,
    /// `AppError::Sync` on other git failures.
    pub async fn push(&self, message: &str) -> Result<SyncReport> {
        let result = self.push_inner(message).instrument(info_span!("sync_push")).await;
        self.finish("push", EventType::SyncPush, &result);
        result
    }

    async fn push_inner(&self, message: &str) -> Result<SyncReport> {
        if let Some(reason) = self.precondition().await? {
            info!(%reason, "replication skipped");
            return Ok(SyncReport::skipped(reason));
        }
        let changed = self.commit_local(message).await?;
        let pushed = self.push_commits().await?;
        Ok(SyncReport {
            changed,
            pushed,
            ..SyncReport::default()
        })
    }

    /// Pull, then push with the default commit message.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub async fn sync_once(&self) -> Result<SyncReport> {
        let pulled = self.pull().await?;
        if pulled.skipped.is_some() {
            return Ok(pulled);
        }
        let pushed = self.push(&default_commit_message()).await?;
        Ok(SyncReport {
            changed: pulled.changed + pushed.changed,
            conflicts_resolved: pulled.conflicts_resolved,
            pushed: pushed.pushed,
            skipped: pushed.skipped,
        })
    }

    /// Sync every interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            remote = self.remote,
            branch = self.branch,
            "vault sync started"
        );
        loop {
            if let Err(err) = self.sync_once().await {
                warn!(%err, "vault sync failed");
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("vault sync stopped");
    }

    /// Journal the outcome and refresh the rolling status signal.
    fn finish(&self, operation: &str, event: EventType, result: &Result<SyncReport>) {
        let (status, details) = match result {
            Ok(report) if report.skipped.is_some() => {
                let reason = report.skipped.clone().unwrap_or_default();
                ("skipped", vec![("operation", operation.to_owned()), ("reason", reason)])
            }
            Ok(report) => {
                self.journal.record_or_warn(
                    JournalEntry::new(event, &self.agent)
                        .with_detail("changed", report.changed)
                        .with_detail("conflicts_resolved", report.conflicts_resolved)
                        .with_detail("pushed", report.pushed),
                );
                (
                    "ok",
                    vec![
                        ("operation", operation.to_owned()),
                        ("changed", report.changed.to_string()),
                        ("conflicts_resolved", report.conflicts_resolved.to_string()),
                    ],
                )
            }
            Err(err) => {
                warn!(operation, %err, "replication failed");
                self.journal.record_or_warn(
                    JournalEntry::new(EventType::SyncFailed, &self.agent)
                        .with_detail("operation", operation)
                        .with_reason(err.to_string()),
                );
                ("error", vec![("operation", operation.to_owned()), ("error", err.to_string())])
            }
        };
        let mut details = details;
        details.push(("remote", self.remote_ref()));
        if let Err(err) = self.signals.write_rolling(SYNC_STATUS, status, &details) {
            warn!(%err, "failed to write sync status signal");
        }
    }
}

/// `chore(vault-sync): auto-sync YYYY-MM-DD HH:MM`.
#[must_use]
pub fn default_commit_message() -> String {
    format!("chore(vault-sync): auto-sync {}", Utc::now().format("%Y-%m-%d %H:%M"))
}
