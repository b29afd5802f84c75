//! Structured event journal.
//!
//! Provides the [`Journal`] trait and associated types. The primary
//! implementation, [`DailyJsonJournal`], keeps one JSON array per calendar
//! day in `Logs/YYYY-MM-DD.json`, rewritten whole on every append.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Event type classification for journal entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A watcher materialized a new task file.
    TaskCreated,
    /// An agent claimed a task into its `In_Progress` directory.
    TaskClaimed,
    /// A claimed task was released back to `Needs_Action`.
    TaskReleased,
    /// A claim was refused by the work-zone policy.
    ClaimRefused,
    /// A draft was written to `Pending_Approval`.
    DraftCreated,
    /// An external side effect completed.
    ActionExecuted,
    /// No adapter was configured; the side effect was recorded only.
    ActionSimulated,
    /// An external side effect failed.
    ActionFailed,
    /// A side effect was deferred by the circuit breaker or rate limiter.
    ActionDeferred,
    /// A manual-action notice was written for a human.
    ManualActionRequired,
    /// A task was moved to `Done`.
    TaskArchived,
    /// A task file was malformed or missing required fields.
    DataError,
    /// A scheduled job finished successfully.
    JobCompleted,
    /// A scheduled job failed or timed out.
    JobFailed,
    /// A replication pull completed.
    SyncPull,
    /// A replication push completed.
    SyncPush,
    /// A replication cycle failed.
    SyncFailed,
    /// Cloud signals were merged into the dashboard.
    SignalsMerged,
    /// A periodic briefing report was written.
    BriefingWritten,
    /// A supervised worker was started.
    WorkerStarted,
    /// A supervised worker was found dead.
    WorkerExited,
    /// A supervised worker exhausted its restart budget.
    WorkerDisabled,
    /// Consolidated watchdog health record.
    WatchdogHealthCheck,
    /// A long-running agent loop started.
    AgentStarted,
    /// A long-running agent loop stopped.
    AgentStopped,
}

/// A structured record of one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// ISO 8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Event classification.
    pub event_type: EventType,
    /// Name of the component or agent that produced the event.
    pub actor: String,
    /// Event-specific fields, flattened into the top-level object.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl JournalEntry {
    /// Construct an entry with no event-specific fields.
    #[must_use]
    pub fn new(event_type: EventType, actor: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            actor: actor.into(),
            details: Map::new(),
        }
    }

    /// Set the task filename this entry concerns.
    #[must_use]
    pub fn with_file(self, file: impl Into<String>) -> Self {
        self.with_detail("file", file.into())
    }

    /// Set the agent name this entry concerns.
    #[must_use]
    pub fn with_agent(self, agent: impl Into<String>) -> Self {
        self.with_detail("agent", agent.into())
    }

    /// Set the human-readable reason for this entry.
    #[must_use]
    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        self.with_detail("reason", reason.into())
    }

    /// Set an arbitrary event-specific field.
    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_owned(), value.into());
        self
    }
}

/// Writes journal entries to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`std::sync::Arc`].
pub trait Journal: Send + Sync {
    /// Record a single entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn record(&self, entry: JournalEntry) -> crate::Result<()>;

    /// Record an entry, downgrading a write failure to a warning.
    ///
    /// Journal failures never abort the operation being journaled.
    fn record_or_warn(&self, entry: JournalEntry) {
        let event_type = entry.event_type;
        if let Err(err) = self.record(entry) {
            warn!(?event_type, %err, "failed to write journal entry");
        }
    }
}

pub use writer::DailyJsonJournal;
