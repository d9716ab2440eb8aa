//! Parameterized step templates shared by several phases.

use std::path::PathBuf;

use tracing::debug;

use crate::core::types::{CheckOutcome, ExecutionRequest};
use crate::error::LabError;
use crate::io::resolver::OrchestrationContext;
use crate::io::runner::{CommandRunner, run};
use crate::step::Reconcile;

/// Ensure a resource exists and is configured.
///
/// A failing probe is the expected "absent" answer and is not an error. An
/// existing resource is satisfied when `converged` accepts the probe's stdout;
/// otherwise `configure` runs again without recreating it.
#[derive(Debug, Clone)]
pub struct EnsureResource {
    pub probe: ExecutionRequest,
    pub create: Vec<ExecutionRequest>,
    /// Runs after creation and whenever an existing resource is not converged.
    pub configure: Vec<ExecutionRequest>,
    pub converged: fn(&str) -> bool,
}

impl EnsureResource {
    pub fn new(probe: ExecutionRequest, create: Vec<ExecutionRequest>) -> Self {
        Self {
            probe,
            create,
            configure: Vec::new(),
            converged: |_| true,
        }
    }

    pub fn configured_by(
        mut self,
        configure: Vec<ExecutionRequest>,
        converged: fn(&str) -> bool,
    ) -> Self {
        self.configure = configure;
        self.converged = converged;
        self
    }

    /// Probe stdout when the resource exists.
    fn inspect(&self, runner: &dyn CommandRunner) -> Result<Option<String>, LabError> {
        let result = run(runner, &self.probe)?;
        if result.success() {
            Ok(Some(result.stdout))
        } else {
            debug!(probe = %self.probe.command_line(), "resource absent");
            Ok(None)
        }
    }
}

impl Reconcile for EnsureResource {
    fn check(
        &self,
        _ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<CheckOutcome, LabError> {
        match self.inspect(runner)? {
            Some(stdout) if (self.converged)(&stdout) => Ok(CheckOutcome::Satisfied),
            Some(_) => {
                debug!(probe = %self.probe.command_line(), "resource not converged");
                Ok(CheckOutcome::NeedsAction)
            }
            None => Ok(CheckOutcome::NeedsAction),
        }
    }

    fn apply(
        &self,
        _ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<(), LabError> {
        if self.inspect(runner)?.is_none() {
            run_all(runner, &self.create)?;
        }
        run_all(runner, &self.configure)
    }
}

/// A file an always-run step hands to an external tool.
#[derive(Debug, Clone)]
pub struct RequiredInput {
    pub path: PathBuf,
    pub purpose: &'static str,
}

impl RequiredInput {
    pub fn new(path: impl Into<PathBuf>, purpose: &'static str) -> Self {
        Self {
            path: path.into(),
            purpose,
        }
    }
}

/// Commands that run on every invocation, relying on the external tool's own
/// idempotency. Inputs are verified before anything is executed.
#[derive(Debug, Clone)]
pub struct AlwaysRun {
    pub inputs: Vec<RequiredInput>,
    pub commands: Vec<ExecutionRequest>,
}

impl AlwaysRun {
    pub fn new(commands: Vec<ExecutionRequest>) -> Self {
        Self {
            inputs: Vec::new(),
            commands,
        }
    }

    pub fn with_input(mut self, input: RequiredInput) -> Self {
        self.inputs.push(input);
        self
    }
}

impl Reconcile for AlwaysRun {
    fn check(
        &self,
        _ctx: &OrchestrationContext,
        _runner: &dyn CommandRunner,
    ) -> Result<CheckOutcome, LabError> {
        Ok(CheckOutcome::NeedsAction)
    }

    fn apply(
        &self,
        _ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<(), LabError> {
        for input in &self.inputs {
            if !input.path.is_file() {
                return Err(LabError::FileNotFound {
                    path: input.path.clone(),
                    purpose: input.purpose,
                });
            }
        }
        run_all(runner, &self.commands)
    }
}

/// Commands that run only while `path` exists.
#[derive(Debug, Clone)]
pub struct WhenPresent {
    pub path: PathBuf,
    pub commands: Vec<ExecutionRequest>,
}

impl Reconcile for WhenPresent {
    fn check(
        &self,
        _ctx: &OrchestrationContext,
        _runner: &dyn CommandRunner,
    ) -> Result<CheckOutcome, LabError> {
        if self.path.exists() {
            Ok(CheckOutcome::NeedsAction)
        } else {
            debug!(path = %self.path.display(), "path absent, nothing to do");
            Ok(CheckOutcome::Satisfied)
        }
    }

    fn apply(
        &self,
        _ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<(), LabError> {
        run_all(runner, &self.commands)
    }
}

fn run_all(
    runner: &dyn CommandRunner,
    commands: &[ExecutionRequest],
) -> Result<(), LabError> {
    for command in commands {
        run(runner, command)?;
    }
    Ok(())
}
