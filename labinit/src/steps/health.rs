//! Delayed reachability probe of the deployed devices.

use std::thread;

use tracing::info;

use crate::core::types::{CheckOutcome, ExecutionRequest};
use crate::error::LabError;
use crate::io::resolver::OrchestrationContext;
use crate::io::runner::{CommandRunner, run};
use crate::step::Reconcile;

/// Wait for the devices to boot, then run the probe command.
#[derive(Debug, Clone)]
pub struct SettleThenProbe {
    pub probe: ExecutionRequest,
}

impl Reconcile for SettleThenProbe {
    fn check(
        &self,
        _ctx: &OrchestrationContext,
        _runner: &dyn CommandRunner,
    ) -> Result<CheckOutcome, LabError> {
        Ok(CheckOutcome::NeedsAction)
    }

    fn apply(
        &self,
        ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<(), LabError> {
        if !ctx.settle_delay.is_zero() {
            println!(
                "    waiting {}s for devices to settle",
                ctx.settle_delay.as_secs()
            );
            thread::sleep(ctx.settle_delay);
        }
        info!(probe = %self.probe.command_line(), "probing devices");
        run(runner, &self.probe)?;
        Ok(())
    }
}
