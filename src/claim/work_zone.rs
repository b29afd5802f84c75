//! Work-zone policy: task categories an agent class must not process.

use crate::mode::AgentMode;
use crate::store::TaskFile;

/// Filename prefixes the cloud agent must not claim.
pub const CLOUD_FORBIDDEN_PREFIXES: &[&str] = &["WHATSAPP_", "PAYMENT_", "BANKING_"];

/// Declared actions the cloud agent must not claim.
pub const CLOUD_FORBIDDEN_ACTIONS: &[&str] = &[
    "send_whatsapp",
    "whatsapp_message",
    "process_payment",
    "bank_transfer",
];

/// Forbidden task categories for one agent class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkZone {
    forbidden_prefixes: Vec<String>,
    forbidden_actions: Vec<String>,
}

impl WorkZone {
    /// Policy applied to agents of `mode`.
    #[must_use]
    pub fn for_mode(mode: AgentMode) -> Self {
        match mode {
            AgentMode::Local => Self::unrestricted(),
            AgentMode::Cloud => Self {
                forbidden_prefixes: CLOUD_FORBIDDEN_PREFIXES
                    .iter()
                    .map(|p| (*p).to_owned())
                    .collect(),
                forbidden_actions: CLOUD_FORBIDDEN_ACTIONS
                    .iter()
                    .map(|a| (*a).to_owned())
                    .collect(),
            },
        }
    }

    /// A policy that forbids nothing.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Reason `name` is outside this agent's work zone, if it is.
    ///
    /// The filename prefix is checked first; the declared `action` field is
    /// checked when the parsed task is available.
    #[must_use]
    pub fn refusal(&self, name: &str, task: Option<&TaskFile>) -> Option<String> {
        let upper = name.to_ascii_uppercase();
        if let Some(prefix) = self
            .forbidden_prefixes
            .iter()
            .find(|prefix| upper.starts_with(prefix.as_str()))
        {
            return Some(format!("filename prefix {prefix} is outside the work zone"));
        }
        let action = task.and_then(TaskFile::action)?.trim().to_ascii_lowercase();
        self.forbidden_actions
            .iter()
            .any(|forbidden| *forbidden == action)
            .then(|| format!("action {action} is outside the work zone"))
    }
}
