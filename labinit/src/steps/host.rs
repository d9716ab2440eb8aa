//! Host prerequisite steps: packages, locale and the automation SSH key.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::core::classify::{locale_listed, package_installed};
use crate::core::types::{CheckOutcome, ExecutionRequest};
use crate::error::LabError;
use crate::io::resolver::OrchestrationContext;
use crate::io::runner::{CommandRunner, run};
use crate::step::Reconcile;

/// Debian packages that must be installed.
#[derive(Debug, Clone)]
pub struct Packages {
    pub names: Vec<String>,
}

impl Packages {
    fn missing(&self, runner: &dyn CommandRunner) -> Result<Vec<String>, LabError> {
        let mut missing = Vec::new();
        for name in &self.names {
            let query =
                ExecutionRequest::probe(["dpkg-query", "-W", "-f=${Status}", name.as_str()]);
            let result = run(runner, &query)?;
            if !(result.success() && package_installed(&result.stdout)) {
                missing.push(name.clone());
            }
        }
        Ok(missing)
    }
}

impl Reconcile for Packages {
    fn check(
        &self,
        _ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<CheckOutcome, LabError> {
        let missing = self.missing(runner)?;
        if missing.is_empty() {
            return Ok(CheckOutcome::Satisfied);
        }
        debug!(?missing, "packages missing");
        Ok(CheckOutcome::NeedsAction)
    }

    fn apply(
        &self,
        _ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<(), LabError> {
        let missing = self.missing(runner)?;
        if missing.is_empty() {
            return Ok(());
        }
        info!(?missing, "installing packages");
        run(runner, &ExecutionRequest::new(["apt-get", "update"]).elevated())?;
        let install = ["apt-get", "install", "-y"]
            .into_iter()
            .map(String::from)
            .chain(missing);
        run(runner, &ExecutionRequest::new(install).elevated())?;

        let still_missing = self.missing(runner)?;
        if !still_missing.is_empty() {
            return Err(LabError::PrerequisiteMissing {
                what: format!("packages not installed: {}", still_missing.join(", ")),
            });
        }
        Ok(())
    }
}

/// A locale that must be generated and set as the system default.
#[derive(Debug, Clone)]
pub struct Locale {
    pub name: String,
}

impl Locale {
    fn available(&self, runner: &dyn CommandRunner) -> Result<bool, LabError> {
        let result = run(runner, &ExecutionRequest::probe(["locale", "-a"]))?;
        Ok(result.success() && locale_listed(&result.stdout, &self.name))
    }
}

impl Reconcile for Locale {
    fn check(
        &self,
        _ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<CheckOutcome, LabError> {
        if self.available(runner)? {
            Ok(CheckOutcome::Satisfied)
        } else {
            Ok(CheckOutcome::NeedsAction)
        }
    }

    fn apply(
        &self,
        _ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<(), LabError> {
        run(
            runner,
            &ExecutionRequest::new(["locale-gen", self.name.as_str()]).elevated(),
        )?;
        let lang = format!("LANG={}", self.name);
        let lc_all = format!("LC_ALL={}", self.name);
        run(
            runner,
            &ExecutionRequest::new(["update-locale", lang.as_str(), lc_all.as_str()]).elevated(),
        )?;
        if !self.available(runner)? {
            return Err(LabError::PrerequisiteMissing {
                what: format!("locale {} not available after generation", self.name),
            });
        }
        Ok(())
    }
}

/// Passphrase-less RSA key used by the automation tool.
///
/// Generated only when absent; an existing key is never rotated.
#[derive(Debug, Clone)]
pub struct SshKey {
    pub path: PathBuf,
}

impl Reconcile for SshKey {
    fn check(
        &self,
        _ctx: &OrchestrationContext,
        _runner: &dyn CommandRunner,
    ) -> Result<CheckOutcome, LabError> {
        if self.path.exists() {
            Ok(CheckOutcome::Satisfied)
        } else {
            Ok(CheckOutcome::NeedsAction)
        }
    }

    fn apply(
        &self,
        _ctx: &OrchestrationContext,
        runner: &dyn CommandRunner,
    ) -> Result<(), LabError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| LabError::io(format!("create directory {}", parent.display()), e))?;
        }
        let path = self.path.display().to_string();
        run(
            runner,
            &ExecutionRequest::new([
                "ssh-keygen",
                "-t",
                "rsa",
                "-b",
                "4096",
                "-f",
                path.as_str(),
                "-N",
                "",
                "-q",
            ]),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeHost, test_context};

    #[test]
    fn installed_packages_are_satisfied() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new().with_packages(["chrony", "locales"]);
        let step = Packages {
            names: vec!["chrony".to_string(), "locales".to_string()],
        };
        assert_eq!(
            step.check(&ctx, &host).expect("check"),
            CheckOutcome::Satisfied
        );
        assert_eq!(host.count("apt-get"), 0);
    }

    #[test]
    fn only_missing_packages_are_installed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new().with_packages(["locales"]);
        let step = Packages {
            names: vec!["chrony".to_string(), "locales".to_string()],
        };
        step.apply(&ctx, &host).expect("apply");
        assert_eq!(host.count("apt-get install -y chrony"), 1);
        assert_eq!(host.count("apt-get install -y chrony locales"), 0);
        assert!(host.has_package("chrony"));
    }

    #[test]
    fn package_still_missing_after_install_is_prerequisite_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new().with_uninstallable("chrony");
        let step = Packages {
            names: vec!["chrony".to_string()],
        };
        let err = step.apply(&ctx, &host).unwrap_err();
        assert!(matches!(err, LabError::PrerequisiteMissing { .. }));
    }

    #[test]
    fn locale_generated_when_absent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new().with_locales(["C", "POSIX"]);
        let step = Locale {
            name: "C.UTF-8".to_string(),
        };
        assert_eq!(
            step.check(&ctx, &host).expect("check"),
            CheckOutcome::NeedsAction
        );
        step.apply(&ctx, &host).expect("apply");
        assert_eq!(host.count("locale-gen C.UTF-8"), 1);
        assert_eq!(
            step.check(&ctx, &host).expect("recheck"),
            CheckOutcome::Satisfied
        );
    }

    #[test]
    fn present_key_suppresses_generation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new();
        let key = temp.path().join("home/.ssh/ansible_id_rsa");
        fs::create_dir_all(key.parent().expect("parent")).expect("mkdir");
        fs::write(&key, "existing").expect("write");

        let step = SshKey { path: key.clone() };
        assert_eq!(
            step.check(&ctx, &host).expect("check"),
            CheckOutcome::Satisfied
        );
        assert_eq!(host.count("ssh-keygen"), 0);
        assert_eq!(fs::read_to_string(&key).expect("read"), "existing");
    }

    #[test]
    fn absent_key_is_generated_without_passphrase() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = test_context(temp.path());
        let host = FakeHost::new();
        let key = temp.path().join("home/.ssh/ansible_id_rsa");
        let step = SshKey { path: key.clone() };

        step.apply(&ctx, &host).expect("apply");

        let expected = format!("ssh-keygen -t rsa -b 4096 -f {} -N  -q", key.display());
        assert_eq!(host.count(&expected), 1);
        assert!(key.exists());
    }
}
