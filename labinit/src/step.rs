//! Reconciliation steps and the phases that group them.

use std::fmt;

use crate::core::types::{CheckOutcome, StepPolicy};
use crate::error::LabError;
use crate::io::resolver::OrchestrationContext;
use crate::io::runner::CommandRunner;

/// Check-then-act unit of work.
///
/// `check` must be side-effect-free and report [`CheckOutcome::Satisfied`]
/// only when `apply` would be a no-op. The sequencer never calls `apply`
/// after a satisfied check.
pub trait Reconcile {
    fn check(
        &self,
        ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<CheckOutcome, LabError>;

    fn apply(&self, ctx: &OrchestrationContext, runner: &dyn CommandRunner)
    -> Result<(), LabError>;
}

/// A named reconciliation with its failure policy.
pub struct Step {
    pub id: String,
    pub policy: StepPolicy,
    action: Box<dyn Reconcile>,
}

impl Step {
    pub fn required(id: impl Into<String>, action: impl Reconcile + 'static) -> Self {
        Self::with_policy(id, StepPolicy::Required, action)
    }

    pub fn best_effort(id: impl Into<String>, action: impl Reconcile + 'static) -> Self {
        Self::with_policy(id, StepPolicy::BestEffort, action)
    }

    fn with_policy(
        id: impl Into<String>,
        policy: StepPolicy,
        action: impl Reconcile + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            policy,
            action: Box::new(action),
        }
    }

    pub fn check(
        &self,
        ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<CheckOutcome, LabError> {
        self.action.check(ctx, runner)
    }

    pub fn apply(
        &self,
        ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<(), LabError> {
        self.action.apply(ctx, runner)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Ordered group of steps reported under one heading.
#[derive(Debug)]
pub struct Phase {
    pub name: &'static str,
    pub steps: Vec<Step>,
}

impl Phase {
    pub fn new(name: &'static str, steps: Vec<Step>) -> Self {
        Self { name, steps }
    }
}
