//! Raw data collection from vendor CLIs
//!
//! Bundles describe each call as an [`Invocation`] and hand it to a
//! [`Collector`], which runs it through a [`CommandRunner`]. Listing the
//! base resources is fatal on failure; everything after that is fetched
//! per resource and a failure only degrades that resource.

mod azure;
mod poll;
mod runner;

#[cfg(test)]
pub(crate) mod mock;
#[cfg(test)]
mod tests;

pub use azure::{ensure_provider_registered, require_az_extension, verify_auth};
pub use poll::{poll_until, PollPolicy};
pub use runner::CliRunner;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{CollectError, TriageError};

/// Stderr fragments that mean the CLI is not authenticated
const AUTH_FAILURE_MARKERS: &[&str] = &[
    "az login",
    "AADSTS",
    "Unauthorized",
    "You must be logged in",
    "status code 401",
    "TF400813",
];

/// A vendor CLI call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `flag value` only when a value is present
    pub fn opt_flag(self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.arg(flag).arg(v),
            _ => self,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,%+".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Trait for running vendor CLI processes
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CollectError>;
}

/// Outcome of a per-resource fetch
#[derive(Debug, Clone)]
pub enum Collected<T> {
    Payload(T),
    Failed { stderr: String },
}

/// One item of a [`Collector::collect_each`] batch
#[derive(Debug)]
pub struct CollectedItem<I, T> {
    pub item: I,
    pub invocation: Invocation,
    pub result: Collected<T>,
}

/// Runs invocations and applies the fatal/degraded split
#[derive(Clone)]
pub struct Collector {
    runner: Arc<dyn CommandRunner>,
}

impl Collector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Run and return stdout, failing on non-zero exit
    pub async fn text(&self, invocation: &Invocation) -> Result<String, CollectError> {
        debug!(command = %invocation, "Running vendor CLI");
        let output = self.runner.run(invocation).await?;
        if !output.is_success() {
            return Err(CollectError::NonZeroExit {
                command: invocation.to_string(),
                code: output.code.unwrap_or(-1),
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    /// Run and deserialize stdout as JSON
    pub async fn json<T: DeserializeOwned>(&self, invocation: &Invocation) -> Result<T, CollectError> {
        let stdout = self.text(invocation).await?;
        serde_json::from_str(&stdout).map_err(|e| CollectError::Parse {
            command: invocation.to_string(),
            reason: e.to_string(),
        })
    }

    /// Fetch the base resource list; any failure aborts the run
    pub async fn list<T: DeserializeOwned>(
        &self,
        what: &str,
        invocation: &Invocation,
    ) -> Result<T, TriageError> {
        self.json(invocation).await.map_err(|e| escalate(what, e))
    }

    /// Fetch JSON for a single resource. Ordinary failures become
    /// [`Collected::Failed`]; authentication failures stay fatal.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        invocation: &Invocation,
    ) -> Result<Collected<T>, TriageError> {
        degrade(invocation, self.json(invocation).await)
    }

    /// Text counterpart of [`Collector::fetch`]
    pub async fn fetch_text(&self, invocation: &Invocation) -> Result<Collected<String>, TriageError> {
        degrade(invocation, self.text(invocation).await)
    }

    /// Fetch one payload per item, sequentially and in order, never
    /// stopping at a per-item failure
    pub async fn collect_each<I, T, F>(
        &self,
        items: Vec<I>,
        mut invocation_for: F,
    ) -> Result<Vec<CollectedItem<I, T>>, TriageError>
    where
        I: Send,
        T: DeserializeOwned + Send,
        F: FnMut(&I) -> Invocation + Send,
    {
        let mut collected = Vec::with_capacity(items.len());
        for item in items {
            let invocation = invocation_for(&item);
            let result = self.fetch(&invocation).await?;
            collected.push(CollectedItem {
                item,
                invocation,
                result,
            });
        }
        Ok(collected)
    }
}

fn degrade<T>(
    invocation: &Invocation,
    result: Result<T, CollectError>,
) -> Result<Collected<T>, TriageError> {
    match result {
        Ok(value) => Ok(Collected::Payload(value)),
        Err(e) if is_auth_failure(&e) => Err(TriageError::Authentication(e.stderr())),
        Err(e) => {
            warn!(command = %invocation, error = %e, "Per-resource collection failed");
            Ok(Collected::Failed { stderr: e.stderr() })
        }
    }
}

fn escalate(what: &str, error: CollectError) -> TriageError {
    if is_auth_failure(&error) {
        TriageError::Authentication(error.stderr())
    } else {
        TriageError::ListFailed {
            what: what.to_string(),
            source: error,
        }
    }
}

/// Whether a CLI failure is an authentication problem
pub fn is_auth_failure(error: &CollectError) -> bool {
    match error {
        CollectError::NonZeroExit { stderr, .. } => {
            AUTH_FAILURE_MARKERS.iter().any(|m| stderr.contains(m))
        }
        _ => false,
    }
}
