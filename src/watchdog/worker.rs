//! One supervised worker process.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::WorkerSpec;
use crate::{AppError, Result};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Not running; may be restarted.
    Stopped,
    /// Process is alive.
    Running,
    /// Restart budget exhausted or spawn failed. Terminal.
    Disabled,
}

/// Health snapshot for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerHealth {
    /// Alive, or deliberately disabled.
    pub healthy: bool,
    /// Process is running.
    pub alive: bool,
    /// Not disabled.
    pub enabled: bool,
    /// Restarts performed so far.
    pub restart_count: u32,
    /// Current process id.
    pub pid: Option<u32>,
}

/// What a supervision step changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Process exited.
    Exited(String),
    /// Process (re)started.
    Started(u32),
    /// Worker disabled.
    Disabled(String),
}

pub(crate) struct Worker {
    pub(crate) spec: WorkerSpec,
    child: Option<Child>,
    state: WorkerState,
    restart_count: u32,
    restart_due: Option<Instant>,
    started_once: bool,
}

impl Worker {
    pub(crate) fn new(spec: WorkerSpec) -> Self {
        Self {
            spec,
            child: None,
            state: WorkerState::Stopped,
            restart_count: 0,
            restart_due: None,
            started_once: false,
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.state
    }

    pub(crate) fn health(&self) -> WorkerHealth {
        let alive = self.state == WorkerState::Running;
        let enabled = self.state != WorkerState::Disabled;
        WorkerHealth {
            healthy: alive || !enabled,
            alive,
            enabled,
            restart_count: self.restart_count,
            pid: self.child.as_ref().and_then(Child::id),
        }
    }

    /// Spawn the process. A spawn failure disables the worker.
    pub(crate) fn start(&mut self, workdir: &Path) -> Transition {
        match self.spawn(workdir) {
            Ok(child) => {
                let pid = child.id().unwrap_or(0);
                if self.started_once {
                    self.restart_count += 1;
                }
                self.started_once = true;
                self.child = Some(child);
                self.state = WorkerState::Running;
                self.restart_due = None;
                info!(
                    worker = self.spec.name,
                    pid,
                    restarts = self.restart_count,
                    "worker started"
                );
                Transition::Started(pid)
            }
            Err(err) => {
                warn!(worker = self.spec.name, %err, "worker could not be spawned; disabling");
                self.disable();
                Transition::Disabled(err.to_string())
            }
        }
    }

    fn spawn(&self, workdir: &Path) -> Result<Child> {
        Command::new(&self.spec.program)
            .args(&self.spec.args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AppError::Process(format!("failed to spawn {}: {err}", self.spec.program))
            })
    }

    fn disable(&mut self) {
        self.state = WorkerState::Disabled;
        self.child = None;
        self.restart_due = None;
    }

    /// Detect an exited process.
    pub(crate) fn poll(&mut self, now: Instant) -> Option<Transition> {
        let child = self.child.as_mut()?;
        let status = match child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            Ok(None) => return None,
            Err(err) => format!("status unknown: {err}"),
        };
        warn!(worker = self.spec.name, %status, "worker exited");
        self.child = None;
        self.state = WorkerState::Stopped;
        self.restart_due = Some(now + Duration::from_secs(self.spec.restart_delay_seconds));
        Some(Transition::Exited(status))
    }

    /// Restart a stopped worker once its delay has passed, or disable it
    /// when the budget is spent.
    pub(crate) fn restart_if_due(&mut self, now: Instant, workdir: &Path) -> Option<Transition> {
        if self.state != WorkerState::Stopped || !self.started_once {
            return None;
        }
        if self.restart_due.is_some_and(|due| due > now) {
            return None;
        }
        if self.restart_count >= self.spec.max_restarts {
            warn!(
                worker = self.spec.name,
                restarts = self.restart_count,
                "restart budget exhausted; worker disabled"
            );
            self.disable();
            return Some(Transition::Disabled(format!(
                "restart budget of {} exhausted",
                self.spec.max_restarts
            )));
        }
        Some(self.start(workdir))
    }

    /// Take the live child for shutdown.
    pub(crate) fn take_child(&mut self) -> Option<Child> {
        if self.state == WorkerState::Running {
            self.state = WorkerState::Stopped;
        }
        self.child.take()
    }
}
