//! Idempotent bootstrap orchestrator for a containerized network lab.
//!
//! A run walks a fixed sequence of phases. Every step inside a phase is a
//! check-then-apply reconciliation, so running the bootstrap again on a
//! converged host changes nothing. The crate is split into:
//!
//! - **[`core`]**: Plain value types and output classification. No I/O.
//! - **[`io`]**: Process spawning, configuration, path resolution and the
//!   files written to disk. Isolated behind [`io::runner::CommandRunner`] so
//!   tests run against a simulated host.
//!
//! [`plan`] builds the phase list, [`steps`] holds the reconciliations and
//! [`sequencer`] runs them under the required/best-effort policy.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
pub mod sequencer;
pub mod step;
pub mod steps;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
