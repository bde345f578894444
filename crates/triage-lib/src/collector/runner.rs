//! Subprocess runner backed by tokio

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{CommandOutput, CommandRunner, Invocation};
use crate::error::CollectError;

/// Default per-command timeout
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Runs vendor CLIs as child processes with a per-command timeout
#[derive(Debug, Clone)]
pub struct CliRunner {
    timeout: Duration,
}

impl CliRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for CliRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

#[async_trait]
impl CommandRunner for CliRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CollectError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let started = std::time::Instant::now();
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| CollectError::TimedOut {
                command: invocation.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| CollectError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        debug!(
            command = %invocation,
            code = ?output.status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Vendor CLI finished"
        );

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
