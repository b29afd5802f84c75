//! Adapter that delegates to an external program.
//!
//! The action is written to the program's stdin as JSON. Exit status maps
//! onto the error taxonomy using the `sysexits` codes: 0 success (stdout is
//! the receipt reference), 65 data, 75 transient, 77 authentication; any
//! other status is a process failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, info_span, Instrument};

use super::{ActionReceipt, AdapterFuture, ServiceAction, ServiceAdapter};
use crate::config::AdapterCommandConfig;
use crate::{AppError, Result};

const EX_DATAERR: i32 = 65;
const EX_TEMPFAIL: i32 = 75;
const EX_NOPERM: i32 = 77;

/// Runs one program per action under a timeout.
#[derive(Debug, Clone)]
pub struct CommandAdapter {
    service: String,
    program: String,
    args: Vec<String>,
    timeout: Duration,
    workdir: PathBuf,
}

impl CommandAdapter {
    /// Adapter for `service` from its config section.
    #[must_use]
    pub fn from_config(service: &str, config: &AdapterCommandConfig, workdir: &Path) -> Self {
        Self {
            service: service.to_owned(),
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            workdir: workdir.to_owned(),
        }
    }

    async fn run(&self, action: &ServiceAction) -> Result<ActionReceipt> {
        let payload = serde_json::to_vec(action)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AppError::Process(format!("failed to spawn {} adapter: {err}", self.service))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await.map_err(|err| {
                AppError::Transient(format!("failed to write to {} adapter: {err}", self.service))
            })?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::Transient(format!(
                    "{} adapter timed out after {}s",
                    self.service,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|err| AppError::Process(format!("{} adapter failed: {err}", self.service)))?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
                info!(service = self.service, action = %action.summary(), "adapter call succeeded");
                Ok(ActionReceipt {
                    reference: (!stdout.is_empty()).then_some(stdout),
                    simulated: false,
                })
            }
            Some(EX_DATAERR) => Err(AppError::Data(format!("{}: {stderr}", self.service))),
            Some(EX_TEMPFAIL) => Err(AppError::Transient(format!("{}: {stderr}", self.service))),
            Some(EX_NOPERM) => Err(AppError::Auth(format!("{}: {stderr}", self.service))),
            Some(code) => Err(AppError::Process(format!(
                "{} adapter exited with code {code}: {stderr}",
                self.service
            ))),
            None => Err(AppError::Process(format!(
                "{} adapter terminated by signal",
                self.service
            ))),
        }
    }
}

impl ServiceAdapter for CommandAdapter {
    fn execute<'a>(&'a self, action: &'a ServiceAction) -> AdapterFuture<'a> {
        let span = info_span!("adapter_call", service = self.service.as_str());
        Box::pin(self.run(action).instrument(span))
    }
}
