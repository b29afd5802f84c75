//! Task routing: classify, plan, then draft, execute, notify or release.
//!
//! [`Router::route_claimed`] handles tasks an agent has just claimed from
//! `Needs_Action`; [`Router::route_decided`] handles files a human moved to
//! `Approved` or `Rejected`. Only the latter ever reaches an adapter.

pub mod actions;
pub mod drafts;
pub mod kind;
pub mod plan;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::adapters::{ActionReceipt, ServiceAdapter};
use crate::claim::{ClaimProtocol, ClaimedTask, WorkZone};
use crate::config::ResilienceConfig;
use crate::journal::{EventType, Journal, JournalEntry};
use crate::mode::AgentMode;
use crate::resilience::ServiceGuard;
use crate::store::{naming, read_task, write_atomic, Header, Stage, TaskFile, TaskStore};
use crate::{AppError, Result};

pub use kind::{classify, Platform, SocialIntent, TaskKind};
pub use plan::{plan, Handling, Phase};

/// What happened to a routed task.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// A draft was written to `Pending_Approval`.
    Drafted {
        /// Draft filename.
        draft: String,
    },
    /// The side effect was performed.
    Executed(ActionReceipt),
    /// Archived without further action.
    Acknowledged,
    /// A manual-action notice was written.
    NoticeWritten {
        /// Notice filename.
        notice: String,
    },
    /// Returned to `Needs_Action`.
    Released {
        /// Why the agent gave the task up.
        reason: String,
    },
    /// Refused by the work zone and released.
    Refused {
        /// Refusal reason.
        reason: String,
    },
    /// Left in place for the next pass.
    Deferred {
        /// Why the call was not attempted.
        reason: String,
    },
    /// Left untouched; this agent never handles it.
    Left,
    /// Annotated with the error and archived.
    Failed {
        /// Error text written to the `status` field.
        reason: String,
    },
}

/// Outcome for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    /// Task filename.
    pub name: String,
    /// Classified kind.
    pub kind: TaskKind,
    /// What was done.
    pub disposition: Disposition,
}

impl RouteOutcome {
    /// Whether the task reached its intended end state.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self.disposition,
            Disposition::Drafted { .. }
                | Disposition::Executed(_)
                | Disposition::Acknowledged
                | Disposition::NoticeWritten { .. }
                | Disposition::Left
        )
    }
}

/// Routes tasks for one agent.
pub struct Router {
    store: TaskStore,
    journal: Arc<dyn Journal>,
    adapter: Arc<dyn ServiceAdapter>,
    guards: HashMap<String, ServiceGuard>,
    resilience: ResilienceConfig,
    mode: AgentMode,
    agent: String,
    work_zone: WorkZone,
}

impl Router {
    /// Router for `agent` running in `mode`.
    #[must_use]
    pub fn new(
        store: TaskStore,
        journal: Arc<dyn Journal>,
        adapter: Arc<dyn ServiceAdapter>,
        resilience: ResilienceConfig,
        mode: AgentMode,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            store,
            journal,
            adapter,
            guards: HashMap::new(),
            resilience,
            mode,
            agent: agent.into(),
            work_zone: WorkZone::for_mode(mode),
        }
    }

    /// Underlying store.
    #[must_use]
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Agent mode this router plans for.
    #[must_use]
    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    /// Route every file in `Approved`, then `Rejected`.
    ///
    /// A failure on one file is logged and does not stop the sweep.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if a stage directory cannot be listed.
    pub async fn sweep(&mut self) -> Result<Vec<RouteOutcome>> {
        if self.mode == AgentMode::Cloud {
            debug!("cloud agent does not act on decided tasks");
            return Ok(Vec::new());
        }
        let mut outcomes = Vec::new();
        for stage in [Stage::Approved, Stage::Rejected] {
            for name in self.store.list(&stage, "*.md")? {
                match self.route_decided(&stage, &name).await {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(AppError::NotFound(_)) => debug!(file = name, "task vanished during sweep"),
                    Err(err) => warn!(file = name, %err, "failed to route decided task"),
                }
            }
        }
        Ok(outcomes)
    }

    /// Route a file a human placed in `Approved` or `Rejected`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the file is gone, `AppError::Io` if
    /// it cannot be archived.
    pub async fn route_decided(&mut self, stage: &Stage, name: &str) -> Result<RouteOutcome> {
        let phase = match stage {
            Stage::Approved => Phase::Approved,
            Stage::Rejected => Phase::Rejected,
            other => {
                return Err(AppError::Config(format!(
                    "{other} holds no decided tasks"
                )))
            }
        };
        let span = info_span!("route", file = name, phase = ?phase);
        self.route_decided_inner(stage, phase, name).instrument(span).await
    }

    async fn route_decided_inner(
        &mut self,
        stage: &Stage,
        phase: Phase,
        name: &str,
    ) -> Result<RouteOutcome> {
        let path = self.store.path_of(stage, name);
        let task = match read_task(&path) {
            Ok(task) => task,
            Err(err @ AppError::Data(_)) => return self.archive_unreadable(stage, name, &err),
            Err(err) => return Err(err),
        };
        let kind = classify(name, &task);
        let handling = plan(&kind, phase, self.mode);
        debug!(kind = %kind, ?handling, "decided task planned");

        let disposition = match handling {
            Handling::Execute => self.execute(stage, name, &kind, &task).await?,
            Handling::Acknowledge => {
                let status = if phase == Phase::Rejected { "rejected" } else { "done" };
                self.archive_decided(stage, name, status, EventType::TaskArchived, None)?;
                Disposition::Acknowledged
            }
            Handling::ManualNotice => {
                let reason = format!("{kind} cannot be executed automatically");
                let notice = self.write_notice(&kind, name, &task, &reason)?;
                self.archive_decided(
                    stage,
                    name,
                    "manual_action_required",
                    EventType::TaskArchived,
                    None,
                )?;
                Disposition::NoticeWritten { notice }
            }
            Handling::Draft | Handling::Release | Handling::Leave => Disposition::Left,
        };
        Ok(RouteOutcome {
            name: name.to_owned(),
            kind,
            disposition,
        })
    }

    async fn execute(
        &mut self,
        stage: &Stage,
        name: &str,
        kind: &TaskKind,
        task: &TaskFile,
    ) -> Result<Disposition> {
        let action = match actions::build_action(kind, task) {
            Ok(action) => action,
            Err(err) => {
                let reason = err.to_string();
                warn!(%err, "approved task is missing required data");
                let status = format!("error: {reason}");
                self.archive_decided(stage, name, &status, EventType::DataError, Some(&reason))?;
                return Ok(Disposition::Failed { reason });
            }
        };

        if self.store.dry_run() {
            info!(action = %action.summary(), "dry run: would execute action");
            return Ok(Disposition::Executed(ActionReceipt {
                reference: None,
                simulated: true,
            }));
        }

        let service = action.service().key();
        let adapter = Arc::clone(&self.adapter);
        let guard = self
            .guards
            .entry(service.to_owned())
            .or_insert_with(|| ServiceGuard::from_config(service, &self.resilience));
        let result = guard.call(|| adapter.execute(&action)).await;

        match result {
            Ok(receipt) => {
                let event = if receipt.simulated {
                    EventType::ActionSimulated
                } else {
                    EventType::ActionExecuted
                };
                info!(action = %action.summary(), simulated = receipt.simulated, "action executed");
                let status = if receipt.simulated { "simulated" } else { "executed" };
                let mut entry = JournalEntry::new(event, &self.agent)
                    .with_file(name)
                    .with_detail("service", service)
                    .with_detail("action", action.summary());
                if let Some(reference) = &receipt.reference {
                    entry = entry.with_detail("reference", reference.as_str());
                }
                self.journal.record_or_warn(entry);
                self.archive_decided(stage, name, status, EventType::TaskArchived, None)?;
                Ok(Disposition::Executed(receipt))
            }
            Err(err) if err.is_deferral() => {
                let reason = err.to_string();
                info!(%err, "action deferred");
                self.journal.record_or_warn(
                    JournalEntry::new(EventType::ActionDeferred, &self.agent)
                        .with_file(name)
                        .with_detail("service", service)
                        .with_reason(&reason),
                );
                Ok(Disposition::Deferred { reason })
            }
            Err(err) => {
                let reason = err.to_string();
                let (status, event) = match err {
                    AppError::Data(_) => (format!("error: {reason}"), EventType::DataError),
                    _ => (format!("failed: {reason}"), EventType::ActionFailed),
                };
                warn!(%reason, "action failed");
                self.archive_decided(stage, name, &status, event, Some(&reason))?;
                Ok(Disposition::Failed { reason })
            }
        }
    }

    fn archive_decided(
        &self,
        stage: &Stage,
        name: &str,
        status: &str,
        event: EventType,
        reason: Option<&str>,
    ) -> Result<()> {
        self.store.set_status(stage, name, status)?;
        self.store.move_task(name, stage, &Stage::Done)?;
        let mut entry = JournalEntry::new(event, &self.agent)
            .with_file(name)
            .with_detail("from", stage.to_string())
            .with_detail("status", status);
        if let Some(reason) = reason {
            entry = entry.with_reason(reason);
        }
        self.journal.record_or_warn(entry);
        Ok(())
    }

    /// Archive a file whose header cannot be parsed as `*_INVALID` in `Done`.
    ///
    /// The status header of such a file cannot be rewritten, so the name
    /// carries the annotation instead.
    fn archive_unreadable(&self, from: &Stage, name: &str, err: &AppError) -> Result<RouteOutcome> {
        let reason = err.to_string();
        warn!(%err, "task file cannot be parsed");
        let dest = self
            .store
            .move_as(name, from, &Stage::Done, &naming::invalid_name(name))?;
        let archived_as = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.journal.record_or_warn(
            JournalEntry::new(EventType::DataError, &self.agent)
                .with_file(name)
                .with_detail("from", from.to_string())
                .with_detail("archived_as", archived_as)
                .with_reason(&reason),
        );
        Ok(RouteOutcome {
            name: name.to_owned(),
            kind: TaskKind::Unknown {
                label: "unreadable".to_owned(),
            },
            disposition: Disposition::Failed { reason },
        })
    }

    /// Route a task this agent just claimed.
    ///
    /// Claimed tasks are never executed. Data problems archive the task
    /// with an annotation; any other failure releases it back to
    /// `Needs_Action`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the task can be neither archived nor
    /// released.
    pub async fn route_claimed(
        &mut self,
        protocol: &ClaimProtocol,
        task: &ClaimedTask,
    ) -> Result<RouteOutcome> {
        let span = info_span!("route", file = task.name.as_str(), agent = task.agent.as_str());
        self.route_claimed_inner(protocol, task).instrument(span).await
    }

    async fn route_claimed_inner(
        &mut self,
        protocol: &ClaimProtocol,
        task: &ClaimedTask,
    ) -> Result<RouteOutcome> {
        let file = match read_task(&task.path) {
            Ok(file) => file,
            Err(err @ AppError::Data(_)) => {
                let stage = Stage::InProgress(task.agent.clone());
                return self.archive_unreadable(&stage, &task.name, &err);
            }
            Err(err) => {
                let reason = format!("unreadable task: {err}");
                protocol.release(task, &reason)?;
                return Ok(RouteOutcome {
                    name: task.name.clone(),
                    kind: TaskKind::Unknown {
                        label: "unreadable".to_owned(),
                    },
                    disposition: Disposition::Released { reason },
                });
            }
        };
        let kind = classify(&task.name, &file);

        if let Some(reason) = self.work_zone.refusal(&task.name, Some(&file)) {
            info!(%reason, "task refused by work zone");
            protocol.release(task, &reason)?;
            self.journal.record_or_warn(
                JournalEntry::new(EventType::ClaimRefused, &self.agent)
                    .with_file(&task.name)
                    .with_reason(&reason),
            );
            return Ok(RouteOutcome {
                name: task.name.clone(),
                kind,
                disposition: Disposition::Refused { reason },
            });
        }

        let handling = plan(&kind, Phase::Claimed, self.mode);
        debug!(kind = %kind, ?handling, "claimed task planned");
        let disposition = match handling {
            Handling::Draft => self.draft(protocol, task, &kind, &file)?,
            Handling::Acknowledge => {
                self.annotate(&task.path, "acknowledged")?;
                protocol.complete(task)?;
                self.journal_archived(task, "acknowledged");
                Disposition::Acknowledged
            }
            Handling::ManualNotice => {
                let reason = format!("no automated handler for {kind}");
                let notice = self.write_notice(&kind, &task.name, &file, &reason)?;
                self.annotate(&task.path, "manual_action_required")?;
                protocol.complete(task)?;
                self.journal_archived(task, "manual_action_required");
                Disposition::NoticeWritten { notice }
            }
            Handling::Release | Handling::Leave | Handling::Execute => {
                let reason = format!("{} agent has no handler for {kind}", self.agent);
                protocol.release(task, &reason)?;
                Disposition::Released { reason }
            }
        };
        Ok(RouteOutcome {
            name: task.name.clone(),
            kind,
            disposition,
        })
    }

    fn draft(
        &self,
        protocol: &ClaimProtocol,
        task: &ClaimedTask,
        kind: &TaskKind,
        file: &TaskFile,
    ) -> Result<Disposition> {
        let draft = match drafts::draft_for(kind, &task.name, file, &self.agent) {
            Ok(draft) => draft,
            Err(err @ AppError::Data(_)) => {
                let reason = err.to_string();
                warn!(%err, "task cannot be drafted");
                self.annotate(&task.path, &format!("error: {reason}"))?;
                protocol.complete(task)?;
                self.journal.record_or_warn(
                    JournalEntry::new(EventType::DataError, &self.agent)
                        .with_file(&task.name)
                        .with_reason(&reason),
                );
                return Ok(Disposition::Failed { reason });
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = self.store.create(&Stage::PendingApproval, &draft.name, &draft.task) {
            let reason = format!("draft write failed: {err}");
            protocol.release(task, &reason)?;
            return Ok(Disposition::Released { reason });
        }
        info!(draft = draft.name, "draft written for approval");
        self.journal.record_or_warn(
            JournalEntry::new(EventType::DraftCreated, &self.agent)
                .with_file(&draft.name)
                .with_detail("source_file", task.name.as_str())
                .with_detail("kind", kind.to_string()),
        );
        self.annotate(&task.path, "drafted")?;
        protocol.complete(task)?;
        self.journal_archived(task, "drafted");
        Ok(Disposition::Drafted { draft: draft.name })
    }

    fn annotate(&self, path: &Path, status: &str) -> Result<()> {
        if self.store.dry_run() {
            return Ok(());
        }
        let mut file = read_task(path)?;
        file.header.set("status", status);
        file.header.set("processed_by", self.agent.as_str());
        write_atomic(path, &file.render())
    }

    fn journal_archived(&self, task: &ClaimedTask, status: &str) {
        self.journal.record_or_warn(
            JournalEntry::new(EventType::TaskArchived, &self.agent)
                .with_file(&task.name)
                .with_detail("status", status),
        );
    }

    /// Write a `NEEDS_MANUAL_ACTION_*` notice into `Needs_Action`.
    ///
    /// Notices are for humans; agents never claim them.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the notice cannot be written.
    pub fn write_notice(
        &self,
        kind: &TaskKind,
        source_name: &str,
        source: &TaskFile,
        reason: &str,
    ) -> Result<String> {
        let prefix = kind::MANUAL_NOTICE_PREFIX.trim_end_matches('_');
        let name = naming::task_name(prefix, source_name);
        let header = Header::new()
            .with("type", "manual_action_required")
            .with("action", source.action().unwrap_or("review"))
            .with("source_file", source_name)
            .with("source_type", kind.to_string())
            .with("created", Utc::now().to_rfc3339())
            .with("priority", "high")
            .with("status", "pending");
        let body = format!(
            "\n# Manual Action Required\n\n**Source:** `{source_name}`\n**Reason:** {reason}\n\n## Original Content\n\n{}\n\n## Next Steps\n\nHandle this by hand, then move this notice to `Done/`.\n",
            source.body.trim()
        );
        self.store
            .create(&Stage::NeedsAction, &name, &TaskFile::new(header, body))?;
        self.journal.record_or_warn(
            JournalEntry::new(EventType::ManualActionRequired, &self.agent)
                .with_file(&name)
                .with_detail("source_file", source_name)
                .with_reason(reason),
        );
        info!(notice = name, "manual action notice written");
        Ok(name)
    }
}
