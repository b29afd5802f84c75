//! Built-in scheduler jobs.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::briefing::write_daily_briefing;
use super::{Job, JobFuture};
use crate::journal::{DailyJsonJournal, Journal};
use crate::orchestrator::spawner::AiAgent;
use crate::router::Router;
use crate::signals::merge_signals;
use crate::store::TaskStore;

/// Runs the external AI agent with a fixed directive.
pub struct AiDirectiveJob {
    name: String,
    directive: String,
    agent: AiAgent,
}

impl AiDirectiveJob {
    /// Job `name` invoking `agent` with `/<directive>`.
    #[must_use]
    pub fn new(name: impl Into<String>, directive: impl Into<String>, agent: AiAgent) -> Self {
        Self {
            name: name.into(),
            directive: directive.into(),
            agent,
        }
    }
}

impl Job for AiDirectiveJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> JobFuture<'_> {
        Box::pin(async move { self.agent.invoke(&self.directive).await })
    }
}

/// Routes anything left in `Approved` or `Rejected`.
///
/// Catches files the folder watcher missed, including deferred ones.
pub struct ApprovedSweepJob {
    router: Arc<Mutex<Router>>,
}

impl ApprovedSweepJob {
    /// Sweep through the shared router.
    #[must_use]
    pub fn new(router: Arc<Mutex<Router>>) -> Self {
        Self { router }
    }
}

impl Job for ApprovedSweepJob {
    fn name(&self) -> &str {
        "approved-sweep"
    }

    fn run(&mut self) -> JobFuture<'_> {
        Box::pin(async move {
            let outcomes = self.router.lock().await.sweep().await?;
            if !outcomes.is_empty() {
                let failed = outcomes.iter().filter(|o| !o.is_success()).count();
                info!(routed = outcomes.len(), failed, "approved sweep finished");
            }
            Ok(())
        })
    }
}

/// Merges cloud signals into the dashboard.
pub struct MergeSignalsJob {
    store: TaskStore,
    journal: Arc<dyn Journal>,
    actor: String,
}

impl MergeSignalsJob {
    /// Merge job acting as `actor`.
    #[must_use]
    pub fn new(store: TaskStore, journal: Arc<dyn Journal>, actor: impl Into<String>) -> Self {
        Self {
            store,
            journal,
            actor: actor.into(),
        }
    }
}

impl Job for MergeSignalsJob {
    fn name(&self) -> &str {
        "merge-signals"
    }

    fn run(&mut self) -> JobFuture<'_> {
        Box::pin(async move {
            merge_signals(&self.store, self.journal.as_ref(), &self.actor)?;
            Ok(())
        })
    }
}

/// Writes today's briefing once.
pub struct BriefingJob {
    store: TaskStore,
    journal: Arc<DailyJsonJournal>,
    actor: String,
}

impl BriefingJob {
    /// Briefing job reading and writing `journal`.
    #[must_use]
    pub fn new(store: TaskStore, journal: Arc<DailyJsonJournal>, actor: impl Into<String>) -> Self {
        Self {
            store,
            journal,
            actor: actor.into(),
        }
    }
}

impl Job for BriefingJob {
    fn name(&self) -> &str {
        "daily-briefing"
    }

    fn run(&mut self) -> JobFuture<'_> {
        Box::pin(async move {
            write_daily_briefing(&self.store, &self.journal, &self.actor, false)?;
            Ok(())
        })
    }
}
