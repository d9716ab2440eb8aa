//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They describe external calls
//! as values and interpret their results.

pub mod classify;
pub mod types;
