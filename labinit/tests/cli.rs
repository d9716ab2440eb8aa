//! CLI tests for the `labinit` binary.
//!
//! Only paths that stop before any external command runs are exercised here;
//! full runs are covered against the simulated host in `bootstrap_lifecycle`.

use std::fs;
use std::process::Command;

use labinit::exit_codes;
use labinit::io::resolver::{ROOT_ENV, SSH_KEY_ENV};

#[test]
fn invalid_config_exits_with_invalid_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("labinit.toml"),
        "bridges = [\"not a bridge name\"]\n",
    )
    .expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_labinit"))
        .env(ROOT_ENV, temp.path())
        .env(SSH_KEY_ENV, temp.path().join("id_rsa"))
        .output()
        .expect("run labinit");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not a bridge name"), "{stderr}");
    assert!(!temp.path().join(".labinit").exists());
}

#[test]
fn rejects_unexpected_arguments() {
    let status = Command::new(env!("CARGO_BIN_EXE_labinit"))
        .arg("deploy")
        .status()
        .expect("run labinit");
    assert_eq!(status.code(), Some(exit_codes::USAGE));
}

#[test]
fn version_flag_succeeds() {
    let output = Command::new(env!("CARGO_BIN_EXE_labinit"))
        .arg("--version")
        .output()
        .expect("run labinit");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("labinit "));
}
