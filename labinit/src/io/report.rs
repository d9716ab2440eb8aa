//! Run report stored under `.labinit/last_run.json`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{StepPolicy, StepStatus};
use crate::error::LabError;

/// Outcome of one step within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepRecord {
    pub phase: String,
    pub step: String,
    pub policy: StepPolicy,
    pub status: StepStatus,
    /// Error text for failed steps.
    pub detail: Option<String>,
}

/// Everything a run did, in execution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub steps: Vec<StepRecord>,
    /// Id of the required step that aborted the run.
    pub aborted_at: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn status_of(&self, step: &str) -> Option<StepStatus> {
        self.steps.iter().find(|s| s.step == step).map(|s| s.status)
    }
}

/// Atomically write the report to disk (temp file + rename).
pub fn write_report(path: &Path, report: &RunReport) -> Result<(), LabError> {
    debug!(path = %path.display(), steps = report.steps.len(), "writing run report");
    let mut buf = serde_json::to_string_pretty(report)
        .map_err(|e| LabError::io("serialize run report", e.into()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), LabError> {
    let parent = path.parent().ok_or_else(|| {
        LabError::Config(format!("report path missing parent {}", path.display()))
    })?;
    fs::create_dir_all(parent)
        .map_err(|e| LabError::io(format!("create directory {}", parent.display()), e))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .map_err(|e| LabError::io(format!("write temp report {}", tmp_path.display()), e))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| LabError::io(format!("replace report {}", path.display()), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_to_stable_json() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".labinit/last_run.json");
        let report = RunReport {
            steps: vec![StepRecord {
                phase: "Time synchronization".to_string(),
                step: "restart-time-sync".to_string(),
                policy: StepPolicy::BestEffort,
                status: StepStatus::Failed,
                detail: Some("command `service chrony restart` failed (exit status 1)".to_string()),
            }],
            aborted_at: None,
            duration_ms: 12,
        };

        write_report(&path, &report).expect("write");

        let contents = fs::read_to_string(&path).expect("read");
        let expected = "{\n  \"steps\": [\n    {\n      \"phase\": \"Time synchronization\",\n      \"step\": \"restart-time-sync\",\n      \"policy\": \"best-effort\",\n      \"status\": \"failed\",\n      \"detail\": \"command `service chrony restart` failed (exit status 1)\"\n    }\n  ],\n  \"aborted_at\": null,\n  \"duration_ms\": 12\n}\n";
        assert_eq!(contents, expected);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn counts_by_status() {
        let record = |step: &str, status| StepRecord {
            phase: "p".to_string(),
            step: step.to_string(),
            policy: StepPolicy::Required,
            status,
            detail: None,
        };
        let report = RunReport {
            steps: vec![
                record("a", StepStatus::Satisfied),
                record("b", StepStatus::Applied),
                record("c", StepStatus::Satisfied),
            ],
            aborted_at: None,
            duration_ms: 0,
        };
        assert_eq!(report.count(StepStatus::Satisfied), 2);
        assert_eq!(report.status_of("b"), Some(StepStatus::Applied));
        assert_eq!(report.status_of("z"), None);
    }
}
