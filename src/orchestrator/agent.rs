//! Claim agent loop.
//!
//! Each pass lists `Needs_Action`, claims what this agent may work on and
//! routes it. Names this process released or refused are skipped until
//! they leave `Needs_Action`, so two agents do not bounce a task between
//! them forever.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::claim::{ClaimOutcome, ClaimProtocol, WorkZone};
use crate::journal::{EventType, Journal, JournalEntry};
use crate::mode::AgentMode;
use crate::router::kind::is_manual_notice;
use crate::router::{Disposition, RouteOutcome, Router};
use crate::signals::SignalWriter;
use crate::store::Stage;
use crate::Result;

/// Counters reported in status signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    /// Completed passes.
    pub passes: u64,
    /// Tasks claimed.
    pub claimed: u64,
    /// Tasks that reached their end state.
    pub completed: u64,
    /// Tasks released or refused.
    pub released: u64,
    /// Tasks archived with an error.
    pub failed: u64,
}

/// Result of one claim pass.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Routing outcome for every task claimed in the pass.
    pub routed: Vec<RouteOutcome>,
    /// Names skipped by the work zone or the skip set.
    pub skipped: usize,
}

impl PassReport {
    /// Whether every claimed task reached its end state.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.routed.iter().all(RouteOutcome::is_success)
    }
}

/// Long-running claim-and-route loop for one agent.
pub struct ClaimAgent {
    protocol: ClaimProtocol,
    router: Router,
    work_zone: WorkZone,
    signals: SignalWriter,
    journal: Arc<dyn Journal>,
    mode: AgentMode,
    skip: HashSet<String>,
    stats: AgentStats,
    poll_interval: Duration,
    status_interval: Duration,
}

impl ClaimAgent {
    /// Agent claiming through `protocol` and routing through `router`.
    #[must_use]
    pub fn new(
        protocol: ClaimProtocol,
        router: Router,
        journal: Arc<dyn Journal>,
        poll_interval: Duration,
        status_interval: Duration,
    ) -> Self {
        let mode = router.mode();
        let signals = SignalWriter::new(protocol.store().clone(), protocol.agent());
        Self {
            protocol,
            router,
            work_zone: WorkZone::for_mode(mode),
            signals,
            journal,
            mode,
            skip: HashSet::new(),
            stats: AgentStats::default(),
            poll_interval,
            status_interval,
        }
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    /// One pass over `Needs_Action`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if `Needs_Action` cannot be listed. Per-task
    /// failures are logged and counted, not returned.
    pub async fn run_once(&mut self) -> Result<PassReport> {
        let names = self.protocol.store().list(&Stage::NeedsAction, "*.md")?;
        let listed: HashSet<&str> = names.iter().map(String::as_str).collect();
        self.skip.retain(|name| listed.contains(name.as_str()));

        let mut report = PassReport::default();
        for name in &names {
            if is_manual_notice(name) || self.skip.contains(name) {
                report.skipped += 1;
                continue;
            }
            if let Some(reason) = self.work_zone.refusal(name, None) {
                debug!(file = name.as_str(), %reason, "outside work zone, not claiming");
                self.journal.record_or_warn(
                    JournalEntry::new(EventType::ClaimRefused, self.protocol.agent())
                        .with_file(name.as_str())
                        .with_reason(reason),
                );
                self.skip.insert(name.clone());
                report.skipped += 1;
                continue;
            }
            match self.claim_one(name).await {
                Ok(Some(outcome)) => report.routed.push(outcome),
                Ok(None) => {}
                Err(err) => warn!(file = name.as_str(), %err, "failed to process task"),
            }
        }
        self.stats.passes += 1;
        if !report.routed.is_empty() {
            info!(
                routed = report.routed.len(),
                skipped = report.skipped,
                "claim pass finished"
            );
        }
        Ok(report)
    }

    /// Claim `name` and route it. `None` when another agent got it.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim or the routing hits a filesystem
    /// failure that left the task neither archived nor released.
    pub async fn claim_one(&mut self, name: &str) -> Result<Option<RouteOutcome>> {
        let task = match self.protocol.claim(name)? {
            ClaimOutcome::Claimed(task) => task,
            ClaimOutcome::NotClaimed(reason) => {
                debug!(file = name, ?reason, "not claimed");
                return Ok(None);
            }
        };
        self.stats.claimed += 1;

        let outcome = self.router.route_claimed(&self.protocol, &task).await?;
        match &outcome.disposition {
            Disposition::Released { .. } | Disposition::Refused { .. } => {
                self.stats.released += 1;
                self.skip.insert(name.to_owned());
            }
            Disposition::Failed { .. } => self.stats.failed += 1,
            _ => self.stats.completed += 1,
        }
        Ok(Some(outcome))
    }

    /// Write a point-in-time `{AGENT}_STATUS` signal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the signal cannot be written.
    pub fn write_status(&self, status: &str) -> Result<()> {
        let prefix = format!("{}_STATUS", self.protocol.agent().to_ascii_uppercase());
        self.signals.write_point(
            &prefix,
            status,
            &[
                ("mode", self.mode.as_str().to_owned()),
                ("passes", self.stats.passes.to_string()),
                ("claimed", self.stats.claimed.to_string()),
                ("completed", self.stats.completed.to_string()),
                ("released", self.stats.released.to_string()),
                ("failed", self.stats.failed.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Poll until `cancel` fires, then write a final status signal.
    pub async fn run(mut self, cancel: CancellationToken) {
        let agent = self.protocol.agent().to_owned();
        info!(
            agent = %agent,
            mode = self.mode.as_str(),
            poll_secs = self.poll_interval.as_secs(),
            "claim agent started"
        );
        self.journal.record_or_warn(
            JournalEntry::new(EventType::AgentStarted, &agent)
                .with_detail("mode", self.mode.as_str()),
        );

        let mut next_status = Instant::now() + self.status_interval;
        loop {
            let span = info_span!("claim_pass", agent = agent.as_str());
            if let Err(err) = self.run_once().instrument(span).await {
                warn!(%err, "claim pass failed");
            }
            if Instant::now() >= next_status {
                if let Err(err) = self.write_status("running") {
                    warn!(%err, "failed to write status signal");
                }
                next_status = Instant::now() + self.status_interval;
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        if let Err(err) = self.write_status("stopped") {
            warn!(%err, "failed to write final status signal");
        }
        self.journal.record_or_warn(
            JournalEntry::new(EventType::AgentStopped, &agent)
                .with_detail("claimed", self.stats.claimed)
                .with_detail("failed", self.stats.failed),
        );
        info!(agent = %agent, "claim agent stopped");
    }
}
