//! Deterministic interpretation of command output.
//!
//! Checks and the fatal policy must agree on what a result means, so the
//! parsing lives here rather than inside individual steps.

use crate::core::types::{ExecutionRequest, ExecutionResult, Privilege};

/// Status string `dpkg-query -W -f=${Status}` prints for an installed package.
const DPKG_INSTALLED: &str = "install ok installed";

/// Diagnostics `sudo` prints when it refuses to run a command.
const DENIAL_MARKERS: &[&str] = &[
    "a password is required",
    "incorrect password attempt",
    "is not in the sudoers file",
    "a terminal is required",
    "not allowed to execute",
];

/// True when a failed elevated command was refused by the elevation wrapper
/// itself rather than by the wrapped program.
///
/// `sudo` exits with status 1 and prefixes its own diagnostics with `sudo:`.
/// It uses the same form for a missing program, which is not a denial (see
/// [`elevated_program_missing`]).
pub fn is_elevation_failure(request: &ExecutionRequest, result: &ExecutionResult) -> bool {
    wrapper_lines(request, result).any(|line| DENIAL_MARKERS.iter().any(|m| line.contains(m)))
}

/// Program name when the elevation wrapper could not find the wrapped program
/// (`sudo: service: command not found`).
pub fn elevated_program_missing(
    request: &ExecutionRequest,
    result: &ExecutionResult,
) -> Option<String> {
    wrapper_lines(request, result).find_map(|line| {
        line.strip_prefix("sudo:")?
            .trim()
            .strip_suffix(": command not found")
            .map(|program| program.trim().to_string())
    })
}

fn wrapper_lines<'a>(
    request: &ExecutionRequest,
    result: &'a ExecutionResult,
) -> impl Iterator<Item = &'a str> {
    let applies = request.privilege == Privilege::Elevated && result.status == Some(1);
    result
        .stderr
        .lines()
        .map(str::trim_start)
        .filter(move |line| applies && line.starts_with("sudo:"))
}

/// Normalize a locale name for comparison (`C.UTF-8` and `c.utf8` are equal).
pub fn normalize_locale(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether `locale -a` output lists `wanted`.
pub fn locale_listed(listing: &str, wanted: &str) -> bool {
    let wanted = normalize_locale(wanted);
    listing
        .lines()
        .any(|line| normalize_locale(line) == wanted)
}

/// Bridge attributes read from `ip -d link show <name>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeFlags {
    /// Administratively up (`UP` in the interface flags).
    pub up: bool,
    pub mcast_snooping: bool,
    pub mcast_querier: bool,
}

impl BridgeFlags {
    pub fn converged(&self) -> bool {
        self.up && self.mcast_snooping && self.mcast_querier
    }
}

/// Parse the detailed link listing of a bridge.
///
/// A bridge without ports reports `state DOWN` even when it is up, so only the
/// `<...>` flag list decides `up`.
pub fn bridge_flags(listing: &str) -> BridgeFlags {
    let up = listing
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .is_some_and(|(flags, _)| flags.split(',').any(|flag| flag == "UP"));
    let tokens: Vec<&str> = listing.split_whitespace().collect();
    let enabled = |key: &str| {
        tokens
            .windows(2)
            .any(|pair| pair[0] == key && pair[1] == "1")
    };
    BridgeFlags {
        up,
        mcast_snooping: enabled("mcast_snooping"),
        mcast_querier: enabled("mcast_querier"),
    }
}

/// Whether `dpkg-query -W -f=${Status}` output reports an installed package.
pub fn package_installed(status_output: &str) -> bool {
    status_output.trim() == DPKG_INSTALLED
}
