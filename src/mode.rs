//! Agent mode: which class of agent this process runs as.
//!
//! `AgentMode` is used as the `--agent-mode` CLI flag value and the
//! `AGENT_MODE` environment override. It selects the work-zone policy,
//! which side effects are permitted, and which scheduler jobs run.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Agent class for the running process.
///
/// Defaults to [`AgentMode::Local`].
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Operator-side agent. May execute approved side effects.
    #[default]
    Local,
    /// Always-on remote agent. Drafts only, never sends, and refuses
    /// sensitive task categories.
    Cloud,
}

impl AgentMode {
    /// Default agent name (the `In_Progress/<agent>` directory) for this mode.
    #[must_use]
    pub fn default_agent_name(self) -> &'static str {
        self.as_str()
    }

    /// Lowercase identifier, as written in config and signals.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }

    /// Parse a mode identifier as accepted by the environment override.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "cloud" => Some(Self::Cloud),
            _ => None,
        }
    }
}
