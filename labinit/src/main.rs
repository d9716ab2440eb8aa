//! Bootstrap a containerized network lab on the local host.
//!
//! Takes no arguments. Resolves the lab root, then reconciles dependencies,
//! bridges, credentials, generated configuration, the container network, the
//! monitoring stack and the topology, in that order. Safe to re-run.

use anyhow::{Context, Result};
use clap::Parser;
use labinit::core::types::StepStatus;
use labinit::exit_codes;
use labinit::io::report::{RunReport, write_report};
use labinit::io::resolver::{OrchestrationContext, ResolverInputs, resolve};
use labinit::io::runner::SystemRunner;
use labinit::logging;
use labinit::plan::build_phases;
use labinit::sequencer::run_phases;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "labinit",
    version,
    about = "Idempotent bootstrap for the containerized network lab"
)]
struct Cli {}

fn main() {
    let _cli = Cli::parse();
    logging::init();

    let ctx = match setup() {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    };
    let runner = SystemRunner::new(&ctx);
    let phases = build_phases(&ctx);

    let code = match run_phases(&phases, &ctx, &runner) {
        Ok(report) => {
            save_report(&ctx, &report);
            println!(
                "lab ready: {} applied, {} satisfied, {} best-effort failures",
                report.count(StepStatus::Applied),
                report.count(StepStatus::Satisfied),
                report.count(StepStatus::Failed),
            );
            exit_codes::OK
        }
        Err(aborted) => {
            save_report(&ctx, &aborted.report);
            let code = exit_codes::for_error(&aborted.error);
            eprintln!("{:#}", anyhow::Error::new(*aborted));
            code
        }
    };
    std::process::exit(code);
}

fn setup() -> Result<OrchestrationContext> {
    let inputs = ResolverInputs::from_process().context("gather resolver inputs")?;
    let ctx = resolve(&inputs)
        .with_context(|| format!("resolve lab context under {}", inputs.root.display()))?;
    Ok(ctx)
}

fn save_report(ctx: &OrchestrationContext, report: &RunReport) {
    if let Err(err) = write_report(&ctx.paths.report_path, report) {
        warn!(error = %err, "could not write run report");
    }
}
