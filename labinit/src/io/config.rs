//! Orchestrator configuration stored in `labinit.toml` at the lab root.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LabError;

/// Linux interface names: at most 15 bytes (IFNAMSIZ - 1).
static IFNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,15}$").expect("valid regex"));
/// Docker network and container names.
static DOCKER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid regex"));

/// Orchestrator configuration (TOML).
///
/// Every field is optional in the file; the defaults describe the reference lab.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LabConfig {
    /// Debian packages that must be installed before anything else runs.
    pub packages: Vec<String>,

    /// Locale exported as `LANG`/`LC_ALL` to every child process.
    pub locale: String,

    /// Data-plane bridges created on the host.
    pub bridges: Vec<String>,

    pub docker_network: DockerNetworkConfig,

    /// Wrapper prefixed to elevated commands. Empty when already running as root.
    pub elevation: Vec<String>,

    /// Service restarted by the time synchronization phase.
    pub time_sync_service: String,

    /// Inventory group pinged by the health probe.
    pub probe_group: String,

    /// Static routes added inside running containers.
    pub routes: Vec<RouteConfig>,

    /// Truncate captured stdout/stderr beyond this many bytes per command.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DockerNetworkConfig {
    pub name: String,
    pub subnet: String,
}

impl Default for DockerNetworkConfig {
    fn default() -> Self {
        Self {
            name: "clab".to_string(),
            subnet: "172.20.20.0/24".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    pub container: String,
    pub destination: String,
    pub gateway: String,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            packages: vec!["chrony".to_string(), "locales".to_string()],
            locale: "C.UTF-8".to_string(),
            bridges: vec!["br-cloud".to_string(), "br-internal".to_string()],
            docker_network: DockerNetworkConfig::default(),
            elevation: vec!["sudo".to_string()],
            time_sync_service: "chrony".to_string(),
            probe_group: "arista".to_string(),
            routes: vec![
                RouteConfig {
                    container: "zabbix-server".to_string(),
                    destination: "172.20.20.0/24".to_string(),
                    gateway: "172.30.0.1".to_string(),
                },
                RouteConfig {
                    container: "grafana".to_string(),
                    destination: "172.20.20.0/24".to_string(),
                    gateway: "172.30.0.1".to_string(),
                },
            ],
            output_limit_bytes: 100_000,
        }
    }
}

impl LabConfig {
    pub fn validate(&self) -> Result<(), LabError> {
        if self.packages.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("packages must not contain empty names"));
        }
        if self.locale.trim().is_empty() {
            return Err(invalid("locale must be non-empty"));
        }
        for bridge in &self.bridges {
            if !IFNAME_RE.is_match(bridge) {
                return Err(invalid(format!("invalid bridge name '{bridge}'")));
            }
        }
        if !DOCKER_NAME_RE.is_match(&self.docker_network.name) {
            return Err(invalid(format!(
                "invalid docker network name '{}'",
                self.docker_network.name
            )));
        }
        validate_cidr("docker_network.subnet", &self.docker_network.subnet)?;
        if self.elevation.iter().any(|part| part.trim().is_empty()) {
            return Err(invalid("elevation must not contain empty arguments"));
        }
        if self.time_sync_service.trim().is_empty() {
            return Err(invalid("time_sync_service must be non-empty"));
        }
        if self.probe_group.trim().is_empty() {
            return Err(invalid("probe_group must be non-empty"));
        }
        for route in &self.routes {
            if !DOCKER_NAME_RE.is_match(&route.container) {
                return Err(invalid(format!(
                    "invalid route container '{}'",
                    route.container
                )));
            }
            validate_cidr("routes.destination", &route.destination)?;
            route.gateway.parse::<Ipv4Addr>().map_err(|_| {
                invalid(format!("invalid route gateway '{}'", route.gateway))
            })?;
        }
        if self.output_limit_bytes == 0 {
            return Err(invalid("output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LabConfig::default()`.
pub fn load_config(path: &Path) -> Result<LabConfig, LabError> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = LabConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path)
        .map_err(|e| LabError::io(format!("read {}", path.display()), e))?;
    let cfg: LabConfig = toml::from_str(&contents)
        .map_err(|e| invalid(format!("parse {}: {e}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}

fn validate_cidr(field: &str, value: &str) -> Result<(), LabError> {
    let bad = || invalid(format!("{field} '{value}' is not an IPv4 CIDR"));
    let (addr, prefix) = value.split_once('/').ok_or_else(bad)?;
    addr.parse::<Ipv4Addr>().map_err(|_| bad())?;
    let prefix: u8 = prefix.parse().map_err(|_| bad())?;
    if prefix > 32 {
        return Err(bad());
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> LabError {
    LabError::Config(msg.into())
}
