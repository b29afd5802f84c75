//! Global configuration parsing, environment overrides and validation.
//!
//! A single [`GlobalConfig`] is built once at process start (TOML file,
//! then environment, then CLI flags) and passed to every component
//! constructor.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::mode::AgentMode;
use crate::{AppError, Result};

/// Claim-agent identity and loop cadence.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent name; the `In_Progress/<name>` directory. Defaults to the mode name.
    #[serde(default)]
    pub name: Option<String>,
    /// Agent class.
    #[serde(default)]
    pub mode: AgentMode,
    /// Seconds between claim passes.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Seconds between point-in-time status signals.
    #[serde(default = "default_status_interval")]
    pub status_interval_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: None,
            mode: AgentMode::default(),
            poll_interval_seconds: default_poll_interval(),
            status_interval_seconds: default_status_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_status_interval() -> u64 {
    900
}

/// Scheduler tick, built-in job intervals and the external AI agent command.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_tick")]
    pub tick_seconds: u64,
    /// External AI agent executable.
    #[serde(default = "default_ai_command")]
    pub ai_command: String,
    /// Arguments placed before the `/<directive>` argument.
    #[serde(default = "default_ai_args")]
    pub ai_args: Vec<String>,
    /// Upper bound on a single AI agent invocation.
    #[serde(default = "default_ai_timeout")]
    pub ai_timeout_seconds: u64,
    /// Interval of the `process-inbox` directive.
    #[serde(default = "default_process_inbox")]
    pub process_inbox_seconds: u64,
    /// Interval of the `update-dashboard` directive.
    #[serde(default = "default_update_dashboard")]
    pub update_dashboard_seconds: u64,
    /// Interval of the approved/rejected sweep.
    #[serde(default = "default_approved_sweep")]
    pub approved_sweep_seconds: u64,
    /// Interval of the signal merge (local mode only).
    #[serde(default = "default_merge_signals")]
    pub merge_signals_seconds: u64,
    /// Interval at which the daily briefing is checked for.
    #[serde(default = "default_briefing_check")]
    pub briefing_check_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick(),
            ai_command: default_ai_command(),
            ai_args: default_ai_args(),
            ai_timeout_seconds: default_ai_timeout(),
            process_inbox_seconds: default_process_inbox(),
            update_dashboard_seconds: default_update_dashboard(),
            approved_sweep_seconds: default_approved_sweep(),
            merge_signals_seconds: default_merge_signals(),
            briefing_check_seconds: default_briefing_check(),
        }
    }
}

fn default_tick() -> u64 {
    5
}

fn default_ai_command() -> String {
    "claude".into()
}

fn default_ai_args() -> Vec<String> {
    vec!["--print".into()]
}

fn default_ai_timeout() -> u64 {
    300
}

fn default_process_inbox() -> u64 {
    1800
}

fn default_update_dashboard() -> u64 {
    3600
}

fn default_approved_sweep() -> u64 {
    60
}

fn default_merge_signals() -> u64 {
    1800
}

fn default_briefing_check() -> u64 {
    3600
}

/// Git replication settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Remote name to pull from and push to.
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Branch to synchronize.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Seconds between sync cycles in continuous mode.
    #[serde(default = "default_sync_interval")]
    pub interval_seconds: u64,
    /// Upper bound on any single git invocation.
    #[serde(default = "default_git_timeout")]
    pub git_timeout_seconds: u64,
    /// Pathspec patterns never staged (credentials, sessions, watcher state).
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            branch: default_branch(),
            interval_seconds: default_sync_interval(),
            git_timeout_seconds: default_git_timeout(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

fn default_remote() -> String {
    "origin".into()
}

fn default_branch() -> String {
    "main".into()
}

fn default_sync_interval() -> u64 {
    300
}

fn default_git_timeout() -> u64 {
    120
}

fn default_exclude_patterns() -> Vec<String> {
    [
        "**/.env",
        "**/*.env",
        "**/credentials*.json",
        "**/token*.json",
        "**/*_session/**",
        "**/.*_state.json",
        "**/.seen_*.json",
    ]
    .iter()
    .map(|p| (*p).to_owned())
    .collect()
}

/// One supervised worker process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerSpec {
    /// Registry name, unique within the watchdog.
    pub name: String,
    /// Executable to launch.
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Restarts allowed before the worker is disabled.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Delay before each restart.
    #[serde(default = "default_restart_delay")]
    pub restart_delay_seconds: u64,
}

fn default_max_restarts() -> u32 {
    5
}

fn default_restart_delay() -> u64 {
    10
}

/// Watchdog supervision settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatchdogConfig {
    /// Seconds between liveness checks and health records.
    #[serde(default = "default_health_interval")]
    pub health_interval_seconds: u64,
    /// Seconds a child gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,
    /// Static worker registry. Empty means "use the built-in registry".
    #[serde(default)]
    pub workers: Vec<WorkerSpec>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            health_interval_seconds: default_health_interval(),
            grace_period_seconds: default_grace_period(),
            workers: Vec::new(),
        }
    }
}

fn default_health_interval() -> u64 {
    60
}

fn default_grace_period() -> u64 {
    10
}

/// Parameters for the per-service resiliency guard.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ResilienceConfig {
    /// Total attempts for a transient failure, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on the retry delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds an open circuit waits before allowing a trial call.
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_seconds: u64,
    /// Calls allowed per rate-limit interval.
    #[serde(default = "default_max_calls")]
    pub max_calls_per_interval: u32,
    /// Rate-limit interval length.
    #[serde(default = "default_rate_interval")]
    pub rate_interval_seconds: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_seconds: default_recovery_timeout(),
            max_calls_per_interval: default_max_calls(),
            rate_interval_seconds: default_rate_interval(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> u64 {
    60
}

fn default_max_calls() -> u32 {
    10
}

fn default_rate_interval() -> u64 {
    3600
}

/// External program implementing one service adapter.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AdapterCommandConfig {
    /// Executable receiving the action as JSON on stdin.
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Upper bound on one invocation.
    #[serde(default = "default_adapter_timeout")]
    pub timeout_seconds: u64,
}

fn default_adapter_timeout() -> u64 {
    60
}

/// Event-source watcher settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatcherConfig {
    /// Seconds between inbox polls.
    #[serde(default = "default_inbox_poll")]
    pub inbox_poll_seconds: u64,
    /// Maximum number of remembered event IDs per watcher.
    #[serde(default = "default_seen_ids_limit")]
    pub seen_ids_limit: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            inbox_poll_seconds: default_inbox_poll(),
            seen_ids_limit: default_seen_ids_limit(),
        }
    }
}

fn default_inbox_poll() -> u64 {
    10
}

fn default_seen_ids_limit() -> usize {
    1000
}

fn default_vault_root() -> PathBuf {
    PathBuf::from(".")
}

/// Global configuration parsed from `agent-vault.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Root of the Task Store.
    #[serde(default = "default_vault_root")]
    pub vault_root: PathBuf,
    /// Suppress all file mutations and external calls, logging intent instead.
    #[serde(default)]
    pub dry_run: bool,
    /// Claim-agent identity and cadence.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Scheduler and AI agent settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Replication settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Watchdog settings.
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    /// Retry, breaker and rate-limit parameters.
    #[serde(default)]
    pub resilience: ResilienceConfig,
    /// External-service adapter programs keyed by service name.
    #[serde(default)]
    pub adapters: HashMap<String, AdapterCommandConfig>,
    /// Event-source watcher settings.
    #[serde(default)]
    pub watchers: WatcherConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config = Self::parse_toml(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without validating it.
    ///
    /// Used when environment or CLI overrides still have to be applied
    /// before [`GlobalConfig::validate`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the TOML is invalid.
    pub fn parse_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` as the environment.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup("VAULT_PATH").filter(|v| !v.is_empty()) {
            self.vault_root = PathBuf::from(root);
        }
        if let Some(raw) = lookup("DRY_RUN") {
            self.dry_run = parse_flag(&raw);
        }
        if let Some(raw) = lookup("AGENT_MODE") {
            match AgentMode::parse(&raw) {
                Some(mode) => self.agent.mode = mode,
                None => warn!(value = %raw, "ignoring unrecognized AGENT_MODE"),
            }
        }
        if let Some(name) = lookup("AGENT_NAME").filter(|v| !v.is_empty()) {
            self.agent.name = Some(name);
        }
        override_seconds(&lookup, "AGENT_POLL_INTERVAL", &mut self.agent.poll_interval_seconds);
        override_seconds(&lookup, "VAULT_SYNC_INTERVAL", &mut self.sync.interval_seconds);
        if let Some(branch) = lookup("GIT_VAULT_BRANCH").filter(|v| !v.is_empty()) {
            self.sync.branch = branch;
        }
        if let Some(remote) = lookup("GIT_REMOTE").filter(|v| !v.is_empty()) {
            self.sync.remote = remote;
        }
        if let Some(cmd) = lookup("AI_AGENT_COMMAND").filter(|v| !v.is_empty()) {
            self.scheduler.ai_command = cmd;
        }
    }

    /// Validate invariants and canonicalize the vault root.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the vault root does not exist, the agent
    /// name is not a plain directory name, or any interval is zero.
    pub fn validate(&mut self) -> Result<()> {
        let canonical_root = self.vault_root.canonicalize().map_err(|err| {
            AppError::Config(format!(
                "vault root {} invalid: {err}",
                self.vault_root.display()
            ))
        })?;
        if !canonical_root.is_dir() {
            return Err(AppError::Config(format!(
                "vault root {} is not a directory",
                canonical_root.display()
            )));
        }
        self.vault_root = canonical_root;

        let name = self.agent_name();
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
        {
            return Err(AppError::Config(format!("invalid agent name '{name}'")));
        }

        let intervals = [
            ("agent.poll_interval_seconds", self.agent.poll_interval_seconds),
            ("agent.status_interval_seconds", self.agent.status_interval_seconds),
            ("scheduler.tick_seconds", self.scheduler.tick_seconds),
            ("scheduler.ai_timeout_seconds", self.scheduler.ai_timeout_seconds),
            ("sync.interval_seconds", self.sync.interval_seconds),
            ("watchdog.health_interval_seconds", self.watchdog.health_interval_seconds),
            ("watchers.inbox_poll_seconds", self.watchers.inbox_poll_seconds),
            ("resilience.rate_interval_seconds", self.resilience.rate_interval_seconds),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(AppError::Config(format!("{key} must be greater than zero")));
            }
        }

        if self.resilience.max_attempts == 0 {
            return Err(AppError::Config(
                "resilience.max_attempts must be greater than zero".into(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for worker in &self.watchdog.workers {
            if !names.insert(worker.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate watchdog worker '{}'",
                    worker.name
                )));
            }
        }

        Ok(())
    }

    /// Absolute path to the Task Store root.
    #[must_use]
    pub fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    /// Name of this agent's `In_Progress` subdirectory.
    #[must_use]
    pub fn agent_name(&self) -> String {
        self.agent
            .name
            .clone()
            .unwrap_or_else(|| self.agent.mode.default_agent_name().to_owned())
    }

    /// Agent class of this process.
    #[must_use]
    pub fn mode(&self) -> AgentMode {
        self.agent.mode
    }

    /// Interval between claim passes.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.agent.poll_interval_seconds)
    }

    /// Interval between replication cycles.
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.interval_seconds)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            vault_root: default_vault_root(),
            dry_run: false,
            agent: AgentConfig::default(),
            scheduler: SchedulerConfig::default(),
            sync: SyncConfig::default(),
            watchdog: WatchdogConfig::default(),
            resilience: ResilienceConfig::default(),
            adapters: HashMap::new(),
            watchers: WatcherConfig::default(),
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn override_seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut u64) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<u64>() {
            Ok(value) if value > 0 => *target = value,
            _ => warn!(key, value = %raw, "ignoring invalid interval override"),
        }
    }
}
