//! Shared deterministic types for the reconciliation core.
//!
//! These types describe external calls and step outcomes as plain values. They
//! do not perform I/O and are safe to construct and compare in tests.

use serde::{Deserialize, Serialize};

/// Whether a command runs as the invoking user or through the elevation wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Normal,
    Elevated,
}

/// A single external command, described as an argument vector.
///
/// Requests are immutable once built; the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Program followed by its arguments. Never a shell string.
    pub argv: Vec<String>,
    pub privilege: Privilege,
    /// A non-zero exit becomes an error instead of a failed result.
    pub fatal: bool,
    /// Capture stdout/stderr instead of streaming them to the terminal.
    pub capture: bool,
}

impl ExecutionRequest {
    /// Fatal, streamed, unprivileged command.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            privilege: Privilege::Normal,
            fatal: true,
            capture: false,
        }
    }

    /// Side-effect-free query: non-fatal and captured.
    pub fn probe<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(argv).tolerate_failure().captured()
    }

    pub fn elevated(mut self) -> Self {
        self.privilege = Privilege::Elevated;
        self
    }

    pub fn tolerate_failure(mut self) -> Self {
        self.fatal = false;
        self
    }

    pub fn captured(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Final argument vector, with `wrapper` prefixed for elevated requests.
    pub fn full_argv(&self, wrapper: &[String]) -> Vec<String> {
        match self.privilege {
            Privilege::Elevated => wrapper.iter().chain(self.argv.iter()).cloned().collect(),
            Privilege::Normal => self.argv.clone(),
        }
    }

    /// Human-readable command line (without the elevation wrapper).
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Outcome of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code; `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    /// Captured stdout (empty when streamed).
    pub stdout: String,
    /// Captured stderr (empty when streamed).
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Result of a step's check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Target state already holds; apply would be a no-op.
    Satisfied,
    NeedsAction,
}

/// Failure policy attached to every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepPolicy {
    /// Failure aborts the run.
    Required,
    /// Failure is logged and the run continues.
    BestEffort,
}

/// What happened to a step during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Check reported the target state; apply was skipped.
    Satisfied,
    /// Apply ran and succeeded.
    Applied,
    /// Check or apply returned an error.
    Failed,
}
