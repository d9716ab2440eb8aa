//! Stable exit codes for the `labinit` binary.

use crate::error::LabError;

/// Every required step was satisfied or applied.
pub const OK: i32 = 0;
/// A required step failed while running an external tool.
pub const STEP_FAILED: i32 = 1;
/// Unexpected command-line arguments. Reported by clap itself.
pub const USAGE: i32 = 2;
/// The elevation wrapper refused to run a command.
pub const PRIVILEGE_DENIED: i32 = 3;
/// A package, locale or program is missing from the host.
pub const PREREQUISITE_MISSING: i32 = 4;
/// An input file (inventory, playbook, topology, compose) is absent.
pub const INPUT_MISSING: i32 = 5;
/// Configuration or context could not be resolved.
pub const INVALID: i32 = 6;

/// Exit code for a run aborted by `error`.
pub fn for_error(error: &LabError) -> i32 {
    match error {
        LabError::PrivilegeEscalation { .. } => PRIVILEGE_DENIED,
        LabError::PrerequisiteMissing { .. } => PREREQUISITE_MISSING,
        LabError::FileNotFound { .. } => INPUT_MISSING,
        LabError::Config(_) => INVALID,
        LabError::ExternalTool { .. } | LabError::Io { .. } => STEP_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn each_error_kind_has_a_distinct_code() {
        let missing_input = LabError::FileNotFound {
            path: PathBuf::from("topology.clab.yml"),
            purpose: "topology",
        };
        let denied = LabError::PrivilegeEscalation {
            command: "true".to_string(),
            detail: "sudo: a password is required".to_string(),
        };
        assert_eq!(for_error(&missing_input), INPUT_MISSING);
        assert_eq!(for_error(&denied), PRIVILEGE_DENIED);
        assert_eq!(for_error(&LabError::Config("bad".to_string())), INVALID);
        assert_ne!(INVALID, USAGE);
    }
}
