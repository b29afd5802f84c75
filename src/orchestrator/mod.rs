//! Orchestrator runtime and agent processes.
//!
//! The orchestrator routes human decisions as they land (folder watcher)
//! and runs the periodic jobs. The claim agent runs as its own process.

pub mod agent;
pub mod approved_watcher;
pub mod spawner;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::journal::{DailyJsonJournal, Journal};
use crate::mode::AgentMode;
use crate::router::Router;
use crate::scheduler::jobs::{AiDirectiveJob, ApprovedSweepJob, BriefingJob, MergeSignalsJob};
use crate::scheduler::{FirstRun, Scheduler};
use crate::store::TaskStore;
use crate::{AppError, Result};

pub use agent::{AgentStats, ClaimAgent, PassReport};
pub use approved_watcher::{ApprovedWatcher, DecisionEvent};
pub use spawner::AiAgent;

const DECISION_QUEUE: usize = 256;

/// Build the scheduler with the built-in jobs for `config`'s mode.
#[must_use]
pub fn build_scheduler(
    config: &GlobalConfig,
    store: &TaskStore,
    journal: &Arc<DailyJsonJournal>,
    router: &Arc<Mutex<Router>>,
) -> Scheduler {
    let actor = format!("{}-orchestrator", config.agent_name());
    let shared: Arc<dyn Journal> = Arc::clone(journal) as Arc<dyn Journal>;
    let sched = &config.scheduler;
    let ai = AiAgent::from_config(config);
    let secs = Duration::from_secs;

    let mut scheduler =
        Scheduler::new(secs(sched.tick_seconds), Arc::clone(&shared), actor.clone());
    scheduler.register(
        Box::new(AiDirectiveJob::new("process-inbox", "process-inbox", ai.clone())),
        secs(sched.process_inbox_seconds),
        FirstRun::AfterInterval,
    );
    scheduler.register(
        Box::new(AiDirectiveJob::new("update-dashboard", "update-dashboard", ai)),
        secs(sched.update_dashboard_seconds),
        FirstRun::AfterInterval,
    );
    scheduler.register(
        Box::new(ApprovedSweepJob::new(Arc::clone(router))),
        secs(sched.approved_sweep_seconds),
        FirstRun::Immediately,
    );
    if config.mode() == AgentMode::Local {
        scheduler.register(
            Box::new(MergeSignalsJob::new(store.clone(), shared, actor.clone())),
            secs(sched.merge_signals_seconds),
            FirstRun::Immediately,
        );
    }
    scheduler.register(
        Box::new(BriefingJob::new(store.clone(), Arc::clone(journal), actor)),
        secs(sched.briefing_check_seconds),
        FirstRun::AfterInterval,
    );
    scheduler
}

/// Run the folder watcher and the scheduler until `cancel` fires.
///
/// # Errors
///
/// Returns `AppError::Io` if the decision folders cannot be watched.
pub async fn run_orchestrator(
    config: &GlobalConfig,
    store: TaskStore,
    journal: Arc<DailyJsonJournal>,
    router: Router,
    cancel: CancellationToken,
) -> Result<()> {
    let router = Arc::new(Mutex::new(router));
    let scheduler = build_scheduler(config, &store, &journal, &router);

    let (tx, mut rx) = mpsc::channel::<DecisionEvent>(DECISION_QUEUE);
    let watcher = ApprovedWatcher::start(&store, tx)?;

    let scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));
    info!(mode = config.mode().as_str(), "orchestrator running");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else {
                    warn!("decision watcher channel closed");
                    break;
                };
                let mut router = router.lock().await;
                match router.route_decided(&event.stage, &event.name).await {
                    Ok(outcome) => {
                        debug!(
                            file = outcome.name,
                            disposition = ?outcome.disposition,
                            "decision routed"
                        );
                    }
                    Err(AppError::NotFound(_)) => {
                        debug!(file = event.name, "decision already handled");
                    }
                    Err(err) => warn!(file = event.name, %err, "failed to route decision"),
                }
            }
        }
    }

    drop(watcher);
    cancel.cancel();
    if let Err(err) = scheduler_task.await {
        warn!(%err, "scheduler task ended abnormally");
    }
    info!("orchestrator stopped");
    Ok(())
}
