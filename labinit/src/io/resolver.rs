//! Path and environment resolution, performed once at start-up.
//!
//! This is the only module that reads ambient process state (environment
//! variables, executable location, home directory). Everything downstream
//! receives the resulting [`OrchestrationContext`] by shared reference.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::LabError;
use crate::io::config::{LabConfig, load_config};

/// Overrides the orchestrator root.
pub const ROOT_ENV: &str = "LABINIT_ROOT";
/// Overrides the SSH key location.
pub const SSH_KEY_ENV: &str = "LABINIT_SSH_KEY";
/// Device boot/convergence time waited before the health probe.
pub const SETTLE_DELAY: Duration = Duration::from_secs(15);

const CONFIG_FILE: &str = "labinit.toml";
const TOPOLOGY_REL: &str = "docker/ceos-lab/topology.clab.yml";

/// All canonical locations for a lab rooted at `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub topology_file: PathBuf,
    pub device_configs_dir: PathBuf,
    pub inventory_file: PathBuf,
    pub playbook_file: PathBuf,
    pub venv_bin: PathBuf,
    pub zbx_env_dir: PathBuf,
    pub postgres_pid_file: PathBuf,
    pub monitoring_dir: PathBuf,
    pub compose_file: PathBuf,
    pub provisioning_dir: PathBuf,
    pub datasource_file: PathBuf,
    pub plugin_file: PathBuf,
    pub report_path: PathBuf,
    pub ssh_key: PathBuf,
}

impl LabPaths {
    pub fn new(root: impl Into<PathBuf>, ssh_key: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let zbx_env_dir = root.join("zbx_env");
        let monitoring_dir = root.join("monitoring");
        let provisioning_dir = monitoring_dir.join("grafana").join("provisioning");
        Self {
            config_path: root.join(CONFIG_FILE),
            topology_file: root.join(TOPOLOGY_REL),
            device_configs_dir: root.join("docker/ceos-lab/configs"),
            inventory_file: root.join("ansible/inventory/inventory.yml"),
            playbook_file: root.join("ansible/playbooks/generate_configs.yml"),
            venv_bin: root.join("venv").join("bin"),
            postgres_pid_file: zbx_env_dir.join("var/lib/postgresql/data/postmaster.pid"),
            zbx_env_dir,
            compose_file: monitoring_dir.join("docker-compose.yml"),
            datasource_file: provisioning_dir.join("datasources").join("zabbix.yml"),
            plugin_file: provisioning_dir.join("plugins").join("zabbix.yml"),
            provisioning_dir,
            monitoring_dir,
            report_path: root.join(".labinit").join("last_run.json"),
            ssh_key: ssh_key.into(),
            root,
        }
    }
}

/// Programs of the automation tool, preferring the lab's vendored copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ansible_playbook: String,
    pub ansible: String,
}

impl ToolPaths {
    fn resolve(venv_bin: &Path) -> Self {
        let pick = |name: &str| {
            let vendored = venv_bin.join(name);
            if vendored.exists() {
                vendored.display().to_string()
            } else {
                name.to_string()
            }
        };
        Self {
            ansible_playbook: pick("ansible-playbook"),
            ansible: pick("ansible"),
        }
    }
}

/// Immutable view shared by every step of a run.
#[derive(Debug, Clone)]
pub struct OrchestrationContext {
    pub paths: LabPaths,
    pub config: LabConfig,
    pub tools: ToolPaths,
    /// Environment variables set on every child process.
    pub env: Vec<(String, OsString)>,
    pub settle_delay: Duration,
}

/// Ambient inputs to resolution, gathered from the process.
#[derive(Debug, Clone, Default)]
pub struct ResolverInputs {
    pub root: PathBuf,
    pub home: Option<PathBuf>,
    pub ssh_key_override: Option<PathBuf>,
    pub inherited_path: Option<OsString>,
}

impl ResolverInputs {
    /// Gather inputs from environment variables and the executable location.
    pub fn from_process() -> Result<Self, LabError> {
        let root = match std::env::var_os(ROOT_ENV) {
            Some(root) => PathBuf::from(root),
            None => {
                let cwd = std::env::current_dir()
                    .map_err(|e| LabError::io("read current directory", e))?;
                let exe_dir = std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(Path::to_path_buf));
                exe_dir
                    .as_deref()
                    .and_then(find_root)
                    .unwrap_or(cwd)
            }
        };
        Ok(Self {
            root,
            home: dirs::home_dir(),
            ssh_key_override: std::env::var_os(SSH_KEY_ENV).map(PathBuf::from),
            inherited_path: std::env::var_os("PATH"),
        })
    }
}

/// First ancestor of `start` (inclusive) that looks like a lab root.
pub fn find_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE).is_file() || dir.join(TOPOLOGY_REL).is_file())
        .map(Path::to_path_buf)
}

/// Compute the orchestration context from gathered inputs.
pub fn resolve(inputs: &ResolverInputs) -> Result<OrchestrationContext, LabError> {
    let ssh_key = match (&inputs.ssh_key_override, &inputs.home) {
        (Some(key), _) => key.clone(),
        (None, Some(home)) => home.join(".ssh").join("ansible_id_rsa"),
        (None, None) => {
            return Err(LabError::Config(format!(
                "cannot locate home directory (set {SSH_KEY_ENV})"
            )));
        }
    };
    let paths = LabPaths::new(&inputs.root, ssh_key);
    let config = load_config(&paths.config_path)?;
    let tools = ToolPaths::resolve(&paths.venv_bin);
    let env = build_env(&config.locale, &paths.venv_bin, inputs.inherited_path.as_ref())?;
    debug!(
        root = %paths.root.display(),
        ssh_key = %paths.ssh_key.display(),
        ansible_playbook = %tools.ansible_playbook,
        "context resolved"
    );
    Ok(OrchestrationContext {
        paths,
        config,
        tools,
        env,
        settle_delay: SETTLE_DELAY,
    })
}

fn build_env(
    locale: &str,
    venv_bin: &Path,
    inherited_path: Option<&OsString>,
) -> Result<Vec<(String, OsString)>, LabError> {
    let mut env = vec![
        ("LANG".to_string(), OsString::from(locale)),
        ("LC_ALL".to_string(), OsString::from(locale)),
    ];
    if venv_bin.is_dir() {
        info!(venv = %venv_bin.display(), "prepending vendored tool directory to PATH");
        let mut entries = vec![venv_bin.to_path_buf()];
        if let Some(path) = inherited_path {
            entries.extend(std::env::split_paths(path));
        }
        let joined = std::env::join_paths(entries)
            .map_err(|e| LabError::Config(format!("cannot build PATH: {e}")))?;
        env.push(("PATH".to_string(), joined));
    } else {
        debug!(venv = %venv_bin.display(), "no vendored tool directory, using system tools");
    }
    Ok(env)
}
