//! Monitoring provisioning: static descriptor files.

use tracing::info;

use crate::core::types::CheckOutcome;
use crate::error::LabError;
use crate::io::artifact::{Artifact, write_artifact};
use crate::io::resolver::OrchestrationContext;
use crate::io::runner::CommandRunner;
use crate::step::Reconcile;

/// Re-assert a fixed set of files on every run.
#[derive(Debug, Clone)]
pub struct WriteArtifacts {
    pub artifacts: Vec<Artifact>,
}

impl Reconcile for WriteArtifacts {
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
        _runner: &dyn CommandRunner,
    ) -> Result<(), LabError> {
        for artifact in &self.artifacts {
            write_artifact(&artifact.path, artifact.content)?;
        }
        info!(count = self.artifacts.len(), "provisioning files written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::io::artifact::monitoring_artifacts;
    use crate::test_support::{FakeHost, test_context};

    #[test]
    fn rewrites_are_byte_identical_regardless_of_prior_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new();
        let step = WriteArtifacts {
            artifacts: monitoring_artifacts(&ctx.paths),
        };

        step.apply(&ctx, &host).expect("first write");
        let first = fs::read(&ctx.paths.datasource_file).expect("read");

        fs::write(&ctx.paths.datasource_file, "tampered: true\n").expect("tamper");
        fs::write(&ctx.paths.plugin_file, "").expect("truncate");
        step.apply(&ctx, &host).expect("second write");

        assert_eq!(fs::read(&ctx.paths.datasource_file).expect("read"), first);
        assert_eq!(
            fs::read_to_string(&ctx.paths.plugin_file).expect("read"),
            crate::io::artifact::PLUGIN_YAML
        );
        assert!(host.calls().is_empty());
    }
}
