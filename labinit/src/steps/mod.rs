//! Concrete [`Reconcile`](crate::step::Reconcile) implementations.

pub mod health;
pub mod host;
pub mod monitoring;
pub mod templates;

pub use health::SettleThenProbe;
pub use host::{Locale, Packages, SshKey};
pub use monitoring::WriteArtifacts;
pub use templates::{AlwaysRun, EnsureResource, RequiredInput, WhenPresent};
