//! Error taxonomy for reconciliation failures.

use std::path::PathBuf;

use thiserror::Error;

/// Failure surfaced by a step, a command, or context resolution.
#[derive(Debug, Error)]
pub enum LabError {
    /// A required package, locale or program is not available on the host.
    #[error("prerequisite missing: {what}")]
    PrerequisiteMissing { what: String },

    /// The elevation wrapper refused to run a command.
    #[error("privilege escalation denied for `{command}`: {detail}")]
    PrivilegeEscalation { command: String, detail: String },

    /// An external command exited unsuccessfully.
    #[error("command `{command}` failed ({}){}", describe_status(.status), render_stderr(.stderr))]
    ExternalTool {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// An input file the orchestrator hands to an external tool is absent.
    #[error("{purpose} not found: {}", .path.display())]
    FileNotFound { path: PathBuf, purpose: &'static str },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LabError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Errors that abort the run even when raised by a best-effort step.
    pub fn is_always_fatal(&self) -> bool {
        matches!(self, Self::PrivilegeEscalation { .. })
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn render_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}
