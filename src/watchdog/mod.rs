//! Process watchdog.
//!
//! Supervises a static registry of worker processes. An exited worker is
//! restarted after its delay until its restart budget is spent, then it is
//! disabled for good. A consolidated health record goes to the journal on
//! every health interval.

pub mod worker;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{GlobalConfig, WorkerSpec};
use crate::journal::{EventType, Journal, JournalEntry};
use crate::{AppError, Result};

pub use worker::{Transition, WorkerHealth, WorkerState};

use worker::Worker;

const SUPERVISE_TICK: Duration = Duration::from_secs(1);

/// Supervisor for a fixed set of workers.
pub struct Watchdog {
    workers: Vec<Worker>,
    workdir: PathBuf,
    journal: Arc<dyn Journal>,
    actor: String,
    health_interval: Duration,
    grace_period: Duration,
}

impl Watchdog {
    /// Watchdog over `specs`, running workers in `workdir`.
    #[must_use]
    pub fn new(
        specs: Vec<WorkerSpec>,
        workdir: PathBuf,
        journal: Arc<dyn Journal>,
        health_interval: Duration,
        grace_period: Duration,
    ) -> Self {
        Self {
            workers: specs.into_iter().map(Worker::new).collect(),
            workdir,
            journal,
            actor: "watchdog".to_owned(),
            health_interval,
            grace_period,
        }
    }

    /// Watchdog from `[watchdog]`; an empty registry means
    /// [`default_registry`] for this executable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the registry is empty and the current
    /// executable cannot be located.
    pub fn from_config(
        config: &GlobalConfig,
        config_path: Option<&Path>,
        journal: Arc<dyn Journal>,
    ) -> Result<Self> {
        let specs = if config.watchdog.workers.is_empty() {
            let exe = std::env::current_exe().map_err(|err| {
                AppError::Config(format!("cannot locate own executable: {err}"))
            })?;
            default_registry(&exe, config, config_path)
        } else {
            config.watchdog.workers.clone()
        };
        Ok(Self::new(
            specs,
            config.vault_root().to_owned(),
            journal,
            Duration::from_secs(config.watchdog.health_interval_seconds),
            Duration::from_secs(config.watchdog.grace_period_seconds),
        ))
    }

    /// Current state of `name`.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<WorkerState> {
        self.workers
            .iter()
            .find(|w| w.spec.name == name)
            .map(Worker::state)
    }

    /// Health of every worker, keyed by name.
    #[must_use]
    pub fn health(&self) -> BTreeMap<String, WorkerHealth> {
        self.workers
            .iter()
            .map(|w| (w.spec.name.clone(), w.health()))
            .collect()
    }

    /// Start every worker and write the first health record.
    pub fn start_all(&mut self) {
        for worker in &mut self.workers {
            let transition = worker.start(&self.workdir);
            record_transition(self.journal.as_ref(), &self.actor, &worker.spec.name, &transition);
        }
        self.write_health();
    }

    /// Detect exits and perform due restarts.
    pub fn supervise(&mut self) {
        let now = Instant::now();
        let journal = self.journal.as_ref();
        for worker in &mut self.workers {
            if let Some(transition) = worker.poll(now) {
                record_transition(journal, &self.actor, &worker.spec.name, &transition);
            }
            if let Some(transition) = worker.restart_if_due(now, &self.workdir) {
                record_transition(journal, &self.actor, &worker.spec.name, &transition);
            }
        }
    }

    /// Journal a consolidated health record and return it.
    pub fn write_health(&self) -> BTreeMap<String, WorkerHealth> {
        let health = self.health();
        let unhealthy: Vec<&str> = health
            .iter()
            .filter(|(_, h)| !h.healthy)
            .map(|(name, _)| name.as_str())
            .collect();
        if unhealthy.is_empty() {
            debug!(workers = health.len(), "all workers healthy");
        } else {
            warn!(?unhealthy, "unhealthy workers");
        }
        let workers = serde_json::to_value(&health).unwrap_or_default();
        self.journal.record_or_warn(
            JournalEntry::new(EventType::WatchdogHealthCheck, &self.actor)
                .with_detail("workers", workers)
                .with_detail("all_healthy", unhealthy.is_empty()),
        );
        health
    }

    /// One supervision step followed by a health record.
    pub fn check_cycle(&mut self) -> BTreeMap<String, WorkerHealth> {
        self.supervise();
        self.write_health()
    }

    /// Ask every live worker to stop, wait out the grace period, then kill
    /// whatever is left.
    pub async fn shutdown(&mut self) {
        let children: Vec<(String, Child)> = self
            .workers
            .iter_mut()
            .filter_map(|w| w.take_child().map(|c| (w.spec.name.clone(), c)))
            .collect();
        if children.is_empty() {
            return;
        }
        info!(
            workers = children.len(),
            grace_secs = self.grace_period.as_secs(),
            "stopping workers"
        );

        for (name, child) in &children {
            request_stop(name, child);
        }
        let deadline = Instant::now() + self.grace_period;
        for (name, mut child) in children {
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => info!(worker = name, %status, "worker stopped"),
                Ok(Err(err)) => warn!(worker = name, %err, "failed to wait for worker"),
                Err(_) => {
                    warn!(worker = name, "worker ignored stop request; killing");
                    if let Err(err) = child.kill().await {
                        warn!(worker = name, %err, "failed to kill worker");
                    }
                }
            }
            self.journal.record_or_warn(
                JournalEntry::new(EventType::WorkerExited, &self.actor)
                    .with_detail("worker", name.as_str())
                    .with_reason("shutdown"),
            );
        }
    }

    /// Supervise until `cancel` fires, then shut every worker down.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            workers = self.workers.len(),
            health_secs = self.health_interval.as_secs(),
            "watchdog started"
        );
        self.start_all();
        let mut next_health = Instant::now() + self.health_interval;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(SUPERVISE_TICK) => {}
            }
            self.supervise();
            if Instant::now() >= next_health {
                self.write_health();
                next_health = Instant::now() + self.health_interval;
            }
        }
        self.shutdown().await;
        info!("watchdog stopped");
    }
}

fn record_transition(journal: &dyn Journal, actor: &str, worker: &str, transition: &Transition) {
    let entry = match transition {
        Transition::Started(pid) => {
            JournalEntry::new(EventType::WorkerStarted, actor).with_detail("pid", *pid)
        }
        Transition::Exited(status) => {
            JournalEntry::new(EventType::WorkerExited, actor).with_reason(status.as_str())
        }
        Transition::Disabled(reason) => {
            JournalEntry::new(EventType::WorkerDisabled, actor).with_reason(reason.as_str())
        }
    };
    journal.record_or_warn(entry.with_detail("worker", worker));
}

#[cfg(unix)]
fn request_stop(name: &str, child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(worker = name, %err, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn request_stop(name: &str, _child: &Child) {
    debug!(worker = name, "no graceful stop on this platform; waiting for grace period");
}

/// Orchestrator, inbox watcher and sync, each re-invoking `exe` with the
/// current vault, mode and agent name.
#[must_use]
pub fn default_registry(
    exe: &Path,
    config: &GlobalConfig,
    config_path: Option<&Path>,
) -> Vec<WorkerSpec> {
    let mut common = Vec::new();
    if let Some(path) = config_path {
        common.extend(["--config".to_owned(), path.display().to_string()]);
    }
    common.extend([
        "--vault".to_owned(),
        config.vault_root().display().to_string(),
        "--agent-mode".to_owned(),
        config.mode().as_str().to_owned(),
        "--agent-name".to_owned(),
        config.agent_name(),
    ]);
    if config.dry_run {
        common.push("--dry-run".to_owned());
    }
    let program = exe.display().to_string();
    [
        ("orchestrator", "orchestrate", 10, 5),
        ("inbox-watcher", "watch-inbox", 20, 3),
        ("sync", "sync", 5, 10),
    ]
    .into_iter()
    .map(|(name, subcommand, max_restarts, delay)| {
        let mut args = common.clone();
        args.push(subcommand.to_owned());
        WorkerSpec {
            name: name.to_owned(),
            program: program.clone(),
            args,
            max_restarts,
            restart_delay_seconds: delay,
        }
    })
    .collect()
}
