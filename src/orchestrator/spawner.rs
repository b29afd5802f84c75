//! External AI agent invocation.
//!
//! The agent is a host CLI run as `<command> <args…> /<directive>` in the
//! vault directory. Its output is logged, never parsed; the exit code is
//! the only result. The child is killed if it outlives the timeout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// Handle for invoking the configured AI agent CLI.
#[derive(Debug, Clone)]
pub struct AiAgent {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
    dry_run: bool,
}

impl AiAgent {
    /// Agent from the `[scheduler]` section, running in the vault root.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(
            config.scheduler.ai_command.clone(),
            config.scheduler.ai_args.clone(),
            config.vault_root().to_owned(),
            Duration::from_secs(config.scheduler.ai_timeout_seconds),
            config.dry_run,
        )
    }

    /// Agent from explicit parts.
    #[must_use]
    pub fn new(
        program: String,
        args: Vec<String>,
        workdir: PathBuf,
        timeout: Duration,
        dry_run: bool,
    ) -> Self {
        Self {
            program,
            args,
            workdir,
            timeout,
            dry_run,
        }
    }

    /// Run the agent with `/<directive>` and wait for it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the program cannot be spawned or exits
    /// non-zero, `AppError::Transient` if it exceeds the timeout.
    pub async fn invoke(&self, directive: &str) -> Result<()> {
        let span = info_span!("ai_agent", directive, program = self.program.as_str());
        self.invoke_inner(directive).instrument(span).await
    }

    async fn invoke_inner(&self, directive: &str) -> Result<()> {
        let slash = format!("/{directive}");
        if self.dry_run {
            info!(args = ?self.args, "dry run: would invoke ai agent");
            return Ok(());
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&slash)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AppError::Process(format!("failed to spawn {}: {err}", self.program)))?;
        info!(pid = child.id().unwrap_or(0), "ai agent started");

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|err| AppError::Process(format!("ai agent wait failed: {err}")))?,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "ai agent timed out; killed");
                return Err(AppError::Transient(format!(
                    "{} /{directive} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                )));
            }
        };

        debug!(
            stdout_bytes = output.stdout.len(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "ai agent output"
        );
        if output.status.success() {
            info!("ai agent finished");
            Ok(())
        } else {
            Err(AppError::Process(format!(
                "{} /{directive} exited with {}",
                self.program, output.status
            )))
        }
    }
}
