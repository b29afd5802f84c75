//! Cooperative periodic job runner.
//!
//! Jobs run one at a time, in registration order, on a fixed tick. A
//! failing or panicking job is logged and journaled; its next run is
//! always pushed to `now + interval`, measured after it finished.

pub mod briefing;
pub mod jobs;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::journal::{EventType, Journal, JournalEntry};
use crate::Result;

/// Boxed future returned by [`Job::run`].
pub type JobFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A unit of periodic work.
pub trait Job: Send {
    /// Stable job name used in logs and the journal.
    fn name(&self) -> &str;

    /// Run the job once.
    fn run(&mut self) -> JobFuture<'_>;
}

/// When a newly registered job first becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstRun {
    /// On the next tick.
    Immediately,
    /// One interval after registration.
    AfterInterval,
}

/// How one job run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Returned `Ok`.
    Succeeded,
    /// Returned an error.
    Failed(String),
    /// Panicked; the panic was contained.
    Panicked(String),
}

/// Result of one job run within a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    /// Job name.
    pub name: String,
    /// Outcome.
    pub outcome: JobOutcome,
}

struct Entry {
    job: Box<dyn Job>,
    interval: Duration,
    next_run: Instant,
}

/// Single-threaded periodic runner.
pub struct Scheduler {
    entries: Vec<Entry>,
    tick: Duration,
    journal: Arc<dyn Journal>,
    actor: String,
}

impl Scheduler {
    /// Empty scheduler ticking every `tick`.
    #[must_use]
    pub fn new(tick: Duration, journal: Arc<dyn Journal>, actor: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            tick,
            journal,
            actor: actor.into(),
        }
    }

    /// Add a job. Jobs run in registration order.
    pub fn register(&mut self, job: Box<dyn Job>, interval: Duration, first: FirstRun) {
        let now = Instant::now();
        let next_run = match first {
            FirstRun::Immediately => now,
            FirstRun::AfterInterval => now + interval,
        };
        debug!(job = job.name(), interval_secs = interval.as_secs(), ?first, "job registered");
        self.entries.push(Entry {
            job,
            interval,
            next_run,
        });
    }

    /// Names of registered jobs, in run order.
    #[must_use]
    pub fn job_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.job.name()).collect()
    }

    /// When `name` is next due.
    #[must_use]
    pub fn next_run(&self, name: &str) -> Option<Instant> {
        self.entries
            .iter()
            .find(|e| e.job.name() == name)
            .map(|e| e.next_run)
    }

    /// Run every job due at `now`.
    pub async fn tick_at(&mut self, now: Instant) -> Vec<JobReport> {
        let mut reports = Vec::new();
        for entry in &mut self.entries {
            if entry.next_run > now {
                continue;
            }
            let name = entry.job.name().to_owned();
            let span = info_span!("job", job = name.as_str());
            let started = Instant::now();
            let result = AssertUnwindSafe(entry.job.run())
                .catch_unwind()
                .instrument(span)
                .await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let outcome = match result {
                Ok(Ok(())) => JobOutcome::Succeeded,
                Ok(Err(err)) => JobOutcome::Failed(err.to_string()),
                Err(panic) => JobOutcome::Panicked(panic_message(panic.as_ref())),
            };
            match &outcome {
                JobOutcome::Succeeded => {
                    info!(job = name, elapsed_ms, "job completed");
                    self.journal.record_or_warn(
                        JournalEntry::new(EventType::JobCompleted, &self.actor)
                            .with_detail("job", name.as_str())
                            .with_detail("elapsed_ms", elapsed_ms),
                    );
                }
                JobOutcome::Failed(reason) | JobOutcome::Panicked(reason) => {
                    if matches!(outcome, JobOutcome::Panicked(_)) {
                        error!(job = name, reason, "job panicked");
                    } else {
                        warn!(job = name, reason, "job failed");
                    }
                    self.journal.record_or_warn(
                        JournalEntry::new(EventType::JobFailed, &self.actor)
                            .with_detail("job", name.as_str())
                            .with_detail("elapsed_ms", elapsed_ms)
                            .with_reason(reason.as_str()),
                    );
                }
            }

            entry.next_run = Instant::now() + entry.interval;
            reports.push(JobReport { name, outcome });
        }
        reports
    }

    /// Tick until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(jobs = ?self.job_names(), tick_secs = self.tick.as_secs(), "scheduler started");
        loop {
            self.tick_at(Instant::now()).await;
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("scheduler shutting down");
                    break;
                }
                () = tokio::time::sleep(self.tick) => {}
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
