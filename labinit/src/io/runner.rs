//! Command runner abstraction.
//!
//! The [`CommandRunner`] trait decouples steps from process spawning. Steps
//! call [`run`], which applies the fatal policy on top of whatever runner is
//! plugged in, so tests substitute a fake host without changing behavior.

use std::ffi::OsString;
use std::process::Command;

use tracing::{debug, instrument, warn};

use crate::core::classify::{elevated_program_missing, is_elevation_failure};
use crate::core::types::{ExecutionRequest, ExecutionResult};
use crate::error::LabError;
use crate::io::process::{run_captured, run_streamed};
use crate::io::resolver::OrchestrationContext;

/// Executes a request and reports how the process exited.
///
/// Implementations return `Err` only when the process could not be run at
/// all; a non-zero exit is an `Ok` result with `success() == false`.
pub trait CommandRunner {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, LabError>;
}

/// Runner that spawns real processes on the local host.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    elevation: Vec<String>,
    env: Vec<(String, OsString)>,
    output_limit_bytes: usize,
}

impl SystemRunner {
    pub fn new(ctx: &OrchestrationContext) -> Self {
        Self {
            elevation: ctx.config.elevation.clone(),
            env: ctx.env.clone(),
            output_limit_bytes: ctx.config.output_limit_bytes,
        }
    }
}

impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(command = %request.command_line(), elevated = ?request.privilege))]
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, LabError> {
        let argv = request.full_argv(&self.elevation);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| LabError::Config("empty command".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        // Inherit the parent environment and layer the resolved overrides on top.
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));

        if request.capture {
            let output =
                run_captured(cmd, self.output_limit_bytes).map_err(|e| spawn_error(program, e))?;
            Ok(ExecutionResult {
                status: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        } else {
            let status = run_streamed(cmd).map_err(|e| spawn_error(program, e))?;
            Ok(ExecutionResult {
                status: status.code(),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }
}

/// Execute `request` and apply its fatal policy.
///
/// Non-fatal requests always return the result for the caller to inspect.
/// Fatal requests turn a non-zero exit into [`LabError::ExternalTool`].
/// Regardless of `fatal`, a refusal by the elevation wrapper is
/// [`LabError::PrivilegeEscalation`] and a program the wrapper could not find
/// is [`LabError::PrerequisiteMissing`].
pub fn run(
    runner: &dyn CommandRunner,
    request: &ExecutionRequest,
) -> Result<ExecutionResult, LabError> {
    let result = runner.execute(request)?;
    if result.success() {
        return Ok(result);
    }
    if is_elevation_failure(request, &result) {
        warn!(command = %request.command_line(), "elevation denied");
        return Err(LabError::PrivilegeEscalation {
            command: request.command_line(),
            detail: result.stderr.trim().to_string(),
        });
    }
    if let Some(program) = elevated_program_missing(request, &result) {
        return Err(LabError::PrerequisiteMissing {
            what: format!("program '{program}' not found"),
        });
    }
    if !request.fatal {
        debug!(command = %request.command_line(), exit_code = ?result.status, "non-fatal failure");
        return Ok(result);
    }
    Err(LabError::ExternalTool {
        command: request.command_line(),
        status: result.status,
        stderr: result.stderr,
    })
}

fn spawn_error(program: &str, err: std::io::Error) -> LabError {
    if err.kind() == std::io::ErrorKind::NotFound {
        LabError::PrerequisiteMissing {
            what: format!("program '{program}' not found"),
        }
    } else {
        LabError::io(format!("spawn {program}"), err)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct CannedRunner {
        result: ExecutionResult,
        seen: RefCell<Vec<ExecutionRequest>>,
    }

    impl CommandRunner for CannedRunner {
        fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, LabError> {
            self.seen.borrow_mut().push(request.clone());
            Ok(self.result.clone())
        }
    }

    fn canned(result: ExecutionResult) -> CannedRunner {
        CannedRunner {
            result,
            seen: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn fatal_failure_becomes_external_tool_error() {
        let runner = canned(ExecutionResult::failed(2, "boom"));
        let req = ExecutionRequest::new(["ansible-playbook", "site.yml"]);
        let err = run(&runner, &req).unwrap_err();
        match err {
            LabError::ExternalTool {
                command,
                status,
                stderr,
            } => {
                assert_eq!(command, "ansible-playbook site.yml");
                assert_eq!(status, Some(2));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_fatal_failure_is_returned_to_caller() {
        let runner = canned(ExecutionResult::failed(1, "Device \"br0\" does not exist."));
        let req = ExecutionRequest::probe(["ip", "link", "show", "br0"]);
        let result = run(&runner, &req).expect("non-fatal");
        assert!(!result.success());
        assert_eq!(runner.seen.borrow().len(), 1);
    }

    #[test]
    fn elevation_denial_is_fatal_even_when_tolerated() {
        let runner = canned(ExecutionResult::failed(1, "sudo: a password is required\n"));
        let req = ExecutionRequest::new(["true"]).elevated().tolerate_failure();
        let err = run(&runner, &req).unwrap_err();
        assert!(matches!(err, LabError::PrivilegeEscalation { .. }));
    }

    #[test]
    fn program_missing_under_elevation_is_prerequisite() {
        let runner = canned(ExecutionResult::failed(1, "sudo: service: command not found\n"));
        let req = ExecutionRequest::new(["service", "chrony", "restart"]).elevated();
        let err = run(&runner, &req).unwrap_err();
        match err {
            LabError::PrerequisiteMissing { what } => assert!(what.contains("service"), "{what}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn system_runner_reports_missing_program_as_prerequisite() {
        let runner = SystemRunner {
            elevation: Vec::new(),
            env: Vec::new(),
            output_limit_bytes: 1024,
        };
        let req = ExecutionRequest::probe(["labinit-definitely-not-a-real-program"]);
        let err = runner.execute(&req).unwrap_err();
        assert!(matches!(err, LabError::PrerequisiteMissing { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_applies_env_overrides() {
        let runner = SystemRunner {
            elevation: Vec::new(),
            env: vec![("LC_ALL".to_string(), OsString::from("C.UTF-8"))],
            output_limit_bytes: 1024,
        };
        let req = ExecutionRequest::probe(["sh", "-c", "printf %s \"$LC_ALL\""]);
        let result = runner.execute(&req).expect("run");
        assert!(result.success());
        assert_eq!(result.stdout, "C.UTF-8");
    }
}
