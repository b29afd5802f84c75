//! Dispatch table: what to do with a task of a given kind.

use super::kind::{SocialIntent, TaskKind};
use crate::mode::AgentMode;

/// Where the task is being routed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Claimed from `Needs_Action`; side effects must not be sent.
    Claimed,
    /// Human approved; side effects may be sent.
    Approved,
    /// Human rejected.
    Rejected,
}

/// Routing decision for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    /// Perform the side effect through an adapter, then archive.
    Execute,
    /// Write a draft to `Pending_Approval`, then archive the original.
    Draft,
    /// Nothing to do; archive.
    Acknowledge,
    /// Write a manual-action notice, then archive.
    ManualNotice,
    /// Put the task back in `Needs_Action` for another agent.
    Release,
    /// Do not touch the file.
    Leave,
}

/// Total dispatch function over every kind, phase and mode.
///
/// Claimed tasks can at most be drafted; only approved tasks in local mode
/// execute side effects. The cloud agent releases what it has no handler
/// for so the local agent can pick it up.
#[must_use]
pub fn plan(kind: &TaskKind, phase: Phase, mode: AgentMode) -> Handling {
    match phase {
        Phase::Claimed => plan_claimed(kind, mode),
        Phase::Approved if mode == AgentMode::Cloud => Handling::Leave,
        Phase::Approved => plan_approved(kind),
        Phase::Rejected if mode == AgentMode::Cloud => Handling::Leave,
        Phase::Rejected => Handling::Acknowledge,
    }
}

fn plan_claimed(kind: &TaskKind, mode: AgentMode) -> Handling {
    let local = mode == AgentMode::Local;
    match kind {
        TaskKind::Email
        | TaskKind::Social {
            intent: SocialIntent::Post,
            ..
        } => Handling::Draft,
        TaskKind::Social {
            intent: SocialIntent::Acknowledge,
            ..
        } => Handling::Acknowledge,
        TaskKind::Social {
            intent: SocialIntent::Reply,
            ..
        }
        | TaskKind::WhatsApp
        | TaskKind::Invoice { .. } => {
            if local {
                Handling::Draft
            } else {
                Handling::Release
            }
        }
        TaskKind::Payment | TaskKind::Unknown { .. } => {
            if local {
                Handling::ManualNotice
            } else {
                Handling::Release
            }
        }
        TaskKind::FileDrop | TaskKind::ManualNotice => Handling::Release,
    }
}

fn plan_approved(kind: &TaskKind) -> Handling {
    match kind {
        TaskKind::Email
        | TaskKind::Invoice { .. }
        | TaskKind::Social {
            intent: SocialIntent::Post | SocialIntent::Reply,
            ..
        } => Handling::Execute,
        TaskKind::Social {
            intent: SocialIntent::Acknowledge,
            ..
        }
        | TaskKind::ManualNotice => Handling::Acknowledge,
        TaskKind::WhatsApp | TaskKind::Payment | TaskKind::FileDrop | TaskKind::Unknown { .. } => {
            Handling::ManualNotice
        }
    }
}
