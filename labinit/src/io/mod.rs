//! I/O helpers: process spawning, configuration, paths and on-disk artifacts.

pub mod artifact;
pub mod config;
pub mod process;
pub mod report;
pub mod resolver;
pub mod runner;
