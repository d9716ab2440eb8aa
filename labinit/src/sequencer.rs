//! Phase sequencer: runs every step in order, applying the failure policy.
//!
//! For each step the sequencer calls `check`, and `apply` only when the check
//! reports work to do. A failed best-effort step is logged and the run moves
//! on; a failed required step, or any privilege escalation failure, stops the
//! run before the next step starts.

use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::core::types::{CheckOutcome, StepPolicy, StepStatus};
use crate::error::LabError;
use crate::io::report::{RunReport, StepRecord};
use crate::io::resolver::OrchestrationContext;
use crate::io::runner::CommandRunner;
use crate::step::{Phase, Step};

/// A run stopped at a required step.
#[derive(Debug, Error)]
#[error("phase `{phase}` step `{step}` failed")]
pub struct RunAborted {
    pub phase: String,
    pub step: String,
    #[source]
    pub error: LabError,
    /// Steps completed up to and including the failing one.
    pub report: RunReport,
}

/// Execute `phases` in order against `runner`.
#[instrument(skip_all, fields(phases = phases.len()))]
pub fn run_phases(
    phases: &[Phase],
    ctx: &OrchestrationContext,
    runner: &dyn CommandRunner,
) -> Result<RunReport, Box<RunAborted>> {
    let started = Instant::now();
    let mut report = RunReport::default();
    let total = phases.len();

    for (index, phase) in phases.iter().enumerate() {
        println!("==> [{}/{}] {}", index + 1, total, phase.name);
        for step in &phase.steps {
            match reconcile(step, ctx, runner) {
                Ok(status) => {
                    println!(" -> {}: {}", step.id, status_label(status));
                    report.steps.push(record(phase, step, status, None));
                }
                Err(error) => {
                    let fatal = step.policy == StepPolicy::Required || error.is_always_fatal();
                    let detail = Some(error.to_string());
                    report.steps.push(record(phase, step, StepStatus::Failed, detail));
                    if fatal {
                        println!(" -> {}: failed: {error}", step.id);
                        error!(
                            phase = phase.name,
                            step = %step.id,
                            %error,
                            "required step failed"
                        );
                        report.aborted_at = Some(step.id.clone());
                        report.duration_ms = elapsed_ms(started);
                        return Err(Box::new(RunAborted {
                            phase: phase.name.to_string(),
                            step: step.id.clone(),
                            error,
                            report,
                        }));
                    }
                    println!(" -> {}: failed (best-effort): {error}", step.id);
                    warn!(
                        phase = phase.name,
                        step = %step.id,
                        %error,
                        "best-effort step failed"
                    );
                }
            }
        }
    }

    report.duration_ms = elapsed_ms(started);
    info!(
        steps = report.steps.len(),
        duration_ms = report.duration_ms,
        "bootstrap complete"
    );
    Ok(report)
}

#[instrument(skip_all, fields(step = %step.id))]
fn reconcile(
    step: &Step,
    ctx: &OrchestrationContext,
    runner: &dyn CommandRunner,
) -> Result<StepStatus, LabError> {
    match step.check(ctx, runner)? {
        CheckOutcome::Satisfied => Ok(StepStatus::Satisfied),
        CheckOutcome::NeedsAction => {
            step.apply(ctx, runner)?;
            info!("applied");
            Ok(StepStatus::Applied)
        }
    }
}

fn record(phase: &Phase, step: &Step, status: StepStatus, detail: Option<String>) -> StepRecord {
    StepRecord {
        phase: phase.name.to_string(),
        step: step.id.clone(),
        policy: step.policy,
        status,
        detail,
    }
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Satisfied => "satisfied",
        StepStatus::Applied => "applied",
        StepStatus::Failed => "failed",
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::core::types::{ExecutionRequest, ExecutionResult};
    use crate::io::runner::run;
    use crate::step::Reconcile;
    use crate::test_support::{FakeHost, test_context};

    #[derive(Default)]
    struct Counters {
        checks: Cell<u32>,
        applies: Cell<u32>,
    }

    /// Step whose outcome is fixed up front, counting calls.
    struct Scripted {
        satisfied: bool,
        fail_with: Option<fn() -> LabError>,
        counters: Rc<Counters>,
    }

    impl Scripted {
        fn new(satisfied: bool, counters: &Rc<Counters>) -> Self {
            Self {
                satisfied,
                fail_with: None,
                counters: Rc::clone(counters),
            }
        }

        fn failing(error: fn() -> LabError, counters: &Rc<Counters>) -> Self {
            Self {
                satisfied: false,
                fail_with: Some(error),
                counters: Rc::clone(counters),
            }
        }
    }

    impl Reconcile for Scripted {
        fn check(
            &self,
            _ctx: &OrchestrationContext,
            _runner: &dyn CommandRunner,
        ) -> Result<CheckOutcome, LabError> {
            self.counters.checks.set(self.counters.checks.get() + 1);
            Ok(if self.satisfied {
                CheckOutcome::Satisfied
            } else {
                CheckOutcome::NeedsAction
            })
        }

        fn apply(
            &self,
            _ctx: &OrchestrationContext,
            _runner: &dyn CommandRunner,
        ) -> Result<(), LabError> {
            self.counters.applies.set(self.counters.applies.get() + 1);
            match self.fail_with {
                Some(error) => Err(error()),
                None => Ok(()),
            }
        }
    }

    /// Step that runs one elevated command through the host.
    struct Elevated;

    impl Reconcile for Elevated {
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
            run(
                runner,
                &ExecutionRequest::new(["service", "chrony", "restart"])
                    .elevated()
                    .tolerate_failure(),
            )?;
            Ok(())
        }
    }

    fn tool_failure() -> LabError {
        LabError::ExternalTool {
            command: "ansible-playbook".to_string(),
            status: Some(2),
            stderr: "fatal: [localhost]".to_string(),
        }
    }

    #[test]
    fn satisfied_check_skips_apply() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new();
        let counters = Rc::new(Counters::default());
        let phases = vec![Phase::new(
            "one",
            vec![
                Step::required("done", Scripted::new(true, &counters)),
                Step::required("todo", Scripted::new(false, &counters)),
            ],
        )];

        let report = run_phases(&phases, &ctx, &host).expect("run");

        assert_eq!(counters.checks.get(), 2);
        assert_eq!(counters.applies.get(), 1);
        assert_eq!(report.status_of("done"), Some(StepStatus::Satisfied));
        assert_eq!(report.status_of("todo"), Some(StepStatus::Applied));
        assert_eq!(report.aborted_at, None);
    }

    #[test]
    fn best_effort_failure_does_not_stop_the_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new();
        let counters = Rc::new(Counters::default());
        let phases = vec![
            Phase::new(
                "flaky",
                vec![Step::best_effort(
                    "sync",
                    Scripted::failing(tool_failure, &counters),
                )],
            ),
            Phase::new(
                "later",
                vec![Step::required("after", Scripted::new(false, &counters))],
            ),
        ];

        let report = run_phases(&phases, &ctx, &host).expect("run");

        assert_eq!(report.status_of("sync"), Some(StepStatus::Failed));
        assert_eq!(report.status_of("after"), Some(StepStatus::Applied));
        let detail = report.steps[0].detail.as_deref().expect("detail");
        assert!(detail.contains("ansible-playbook"), "{detail}");
    }

    #[test]
    fn required_failure_stops_later_phases() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new();
        let counters = Rc::new(Counters::default());
        let later = Rc::new(Counters::default());
        let phases = vec![
            Phase::new(
                "generate",
                vec![
                    Step::required("render", Scripted::failing(tool_failure, &counters)),
                    Step::required("same-phase", Scripted::new(false, &later)),
                ],
            ),
            Phase::new(
                "deploy",
                vec![Step::required("deploy", Scripted::new(false, &later))],
            ),
        ];

        let aborted = run_phases(&phases, &ctx, &host).unwrap_err();

        assert_eq!(aborted.phase, "generate");
        assert_eq!(aborted.step, "render");
        assert!(matches!(aborted.error, LabError::ExternalTool { .. }));
        assert_eq!(aborted.report.aborted_at.as_deref(), Some("render"));
        assert_eq!(aborted.report.steps.len(), 1);
        assert_eq!(later.checks.get(), 0);
    }

    #[test]
    fn privilege_denial_aborts_even_best_effort_steps() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new().deny_elevation();
        let later = Rc::new(Counters::default());
        let phases = vec![
            Phase::new("sync", vec![Step::best_effort("restart-time-sync", Elevated)]),
            Phase::new(
                "later",
                vec![Step::required("after", Scripted::new(false, &later))],
            ),
        ];

        let aborted = run_phases(&phases, &ctx, &host).unwrap_err();

        assert!(matches!(
            aborted.error,
            LabError::PrivilegeEscalation { .. }
        ));
        assert_eq!(aborted.step, "restart-time-sync");
        assert_eq!(later.checks.get(), 0);
    }

    #[test]
    fn tolerated_command_failure_counts_as_applied() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new();
        host.fail_when(
            "service chrony restart",
            ExecutionResult::failed(1, "chrony: unrecognized service"),
        );
        let phases = vec![Phase::new(
            "sync",
            vec![Step::best_effort("restart-time-sync", Elevated)],
        )];

        let report = run_phases(&phases, &ctx, &host).expect("run");

        assert_eq!(
            report.status_of("restart-time-sync"),
            Some(StepStatus::Applied)
        );
    }

    #[test]
    fn missing_program_in_best_effort_step_does_not_abort() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new();
        host.fail_when(
            "service chrony restart",
            ExecutionResult::failed(1, "sudo: service: command not found\n"),
        );
        let later = Rc::new(Counters::default());
        let phases = vec![
            Phase::new("sync", vec![Step::best_effort("restart-time-sync", Elevated)]),
            Phase::new(
                "later",
                vec![Step::required("after", Scripted::new(false, &later))],
            ),
        ];

        let report = run_phases(&phases, &ctx, &host).expect("run");

        assert_eq!(
            report.status_of("restart-time-sync"),
            Some(StepStatus::Failed)
        );
        let detail = report.steps[0].detail.as_deref().expect("detail");
        assert!(detail.contains("prerequisite missing"), "{detail}");
        assert_eq!(report.status_of("after"), Some(StepStatus::Applied));
        assert_eq!(later.applies.get(), 1);
    }
}
