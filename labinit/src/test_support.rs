//! Test-only helpers: a simulated host and a ready-made orchestration context.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::core::types::{ExecutionRequest, ExecutionResult, Privilege};
use crate::error::LabError;
use crate::io::resolver::{LabPaths, OrchestrationContext, ResolverInputs, resolve};
use crate::io::runner::CommandRunner;

/// Resolve a context rooted at `root` with home under `root/home` and no
/// settle delay.
pub fn test_context(root: &Path) -> OrchestrationContext {
    let inputs = ResolverInputs {
        root: root.to_path_buf(),
        home: Some(root.join("home")),
        ssh_key_override: None,
        inherited_path: Some(OsString::from("/usr/bin:/bin")),
    };
    let mut ctx = resolve(&inputs).expect("resolve test context");
    ctx.settle_delay = Duration::ZERO;
    ctx
}

/// Temporary lab root with every tool input file present.
pub fn lab_root() -> TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    seed_lab_inputs(temp.path());
    temp
}

/// Write minimal inventory, playbook, topology and compose files under `root`.
pub fn seed_lab_inputs(root: &Path) {
    let paths = LabPaths::new(root, root.join("home/.ssh/ansible_id_rsa"));
    let files = [
        (&paths.inventory_file, "all:\n  children:\n    arista: {}\n"),
        (&paths.playbook_file, "- hosts: localhost\n  tasks: []\n"),
        (&paths.topology_file, "name: ceos-lab\ntopology:\n  nodes: {}\n"),
        (&paths.compose_file, "services: {}\n"),
    ];
    for (path, contents) in files {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create input directory");
        }
        fs::write(path, contents).expect("write input file");
    }
}

/// One request observed by [`FakeHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub command: String,
    pub privilege: Privilege,
}

/// Simulated state of a Linux bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeState {
    pub snooping: bool,
    pub querier: bool,
    pub up: bool,
}

#[derive(Debug, Default)]
struct HostState {
    packages: BTreeSet<String>,
    uninstallable: BTreeSet<String>,
    locales: BTreeSet<String>,
    bridges: BTreeMap<String, BridgeState>,
    networks: BTreeMap<String, String>,
    elevation_denied: bool,
    failures: Vec<(String, ExecutionResult)>,
    calls: Vec<Call>,
}

/// In-memory host that understands the commands the bootstrap issues.
///
/// Unknown commands succeed with empty output. Rules registered with
/// [`FakeHost::fail_when`] take precedence over the simulation.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: RefCell<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packages<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .borrow_mut()
            .packages
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// `apt-get install` will report success but never install `name`.
    pub fn with_uninstallable(self, name: &str) -> Self {
        self.state
            .borrow_mut()
            .uninstallable
            .insert(name.to_string());
        self
    }

    pub fn with_locales<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .borrow_mut()
            .locales
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Bridges already present (down, multicast options unset).
    pub fn with_bridges<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .borrow_mut()
            .bridges
            .extend(names.into_iter().map(|n| (n.into(), BridgeState::default())));
        self
    }

    /// Every elevated request fails the way a refused `sudo` does.
    pub fn deny_elevation(self) -> Self {
        self.state.borrow_mut().elevation_denied = true;
        self
    }

    /// Requests whose command line starts with `prefix` return `result`.
    pub fn fail_when(&self, prefix: &str, result: ExecutionResult) {
        self.state
            .borrow_mut()
            .failures
            .push((prefix.to_string(), result));
    }

    pub fn clear_failures(&self) {
        self.state.borrow_mut().failures.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Number of calls whose command line starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.command.starts_with(prefix))
            .count()
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.state.borrow().packages.contains(name)
    }

    pub fn bridge(&self, name: &str) -> Option<BridgeState> {
        self.state.borrow().bridges.get(name).copied()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.state.borrow().networks.contains_key(name)
    }

    pub fn network_subnet(&self, name: &str) -> Option<String> {
        self.state.borrow().networks.get(name).cloned()
    }

    fn simulate(state: &mut HostState, argv: &[&str]) -> ExecutionResult {
        match argv {
            ["dpkg-query", "-W", _, name] => {
                if state.packages.contains(*name) {
                    ExecutionResult::ok("install ok installed")
                } else {
                    ExecutionResult::failed(
                        1,
                        format!("dpkg-query: no packages found matching {name}"),
                    )
                }
            }
            ["apt-get", "install", "-y", names @ ..] => {
                for name in names {
                    if !state.uninstallable.contains(*name) {
                        state.packages.insert((*name).to_string());
                    }
                }
                ExecutionResult::ok("")
            }
            ["locale", "-a"] => {
                let listing: Vec<&str> = state.locales.iter().map(String::as_str).collect();
                ExecutionResult::ok(listing.join("\n"))
            }
            ["locale-gen", name] => {
                state.locales.insert((*name).to_string());
                ExecutionResult::ok("")
            }
            ["ip", "-d", "link", "show", name] => match state.bridges.get(*name) {
                Some(bridge) => ExecutionResult::ok(bridge_listing(name, bridge)),
                None => ExecutionResult::failed(1, format!("Device \"{name}\" does not exist.")),
            },
            ["ip", "link", "add", name, "type", "bridge"] => {
                state.bridges.insert((*name).to_string(), BridgeState::default());
                ExecutionResult::ok("")
            }
            ["ip", "link", "set", "dev", name, rest @ ..] => {
                let Some(bridge) = state.bridges.get_mut(*name) else {
                    return ExecutionResult::failed(1, "Cannot find device");
                };
                match rest {
                    ["up"] => bridge.up = true,
                    ["type", "bridge", "mcast_snooping", snoop, "mcast_querier", querier] => {
                        bridge.snooping = *snoop == "1";
                        bridge.querier = *querier == "1";
                    }
                    _ => {}
                }
                ExecutionResult::ok("")
            }
            ["docker", "network", "inspect", name] => {
                if state.networks.contains_key(*name) {
                    ExecutionResult::ok("[]")
                } else {
                    ExecutionResult::failed(1, format!("Error: No such network: {name}"))
                }
            }
            ["docker", "network", "create", "--subnet", subnet, name] => {
                if state.networks.contains_key(*name) {
                    return ExecutionResult::failed(
                        1,
                        format!("Error response from daemon: network with name {name} already exists"),
                    );
                }
                state
                    .networks
                    .insert((*name).to_string(), (*subnet).to_string());
                ExecutionResult::ok("")
            }
            ["ssh-keygen", rest @ ..] => {
                let key = rest
                    .iter()
                    .position(|arg| *arg == "-f")
                    .and_then(|i| rest.get(i + 1))
                    .map(PathBuf::from);
                if let Some(key) = key {
                    fs::write(&key, "PRIVATE KEY\n").expect("write fake key");
                    fs::write(key.with_extension("pub"), "ssh-rsa AAAA\n")
                        .expect("write fake public key");
                }
                ExecutionResult::ok("")
            }
            _ => ExecutionResult::ok(""),
        }
    }
}

/// `ip -d link show` output for a simulated bridge.
fn bridge_listing(name: &str, bridge: &BridgeState) -> String {
    let flags = if bridge.up {
        "BROADCAST,MULTICAST,UP,LOWER_UP"
    } else {
        "BROADCAST,MULTICAST"
    };
    format!(
        "7: {name}: <{flags}> mtu 1500 qdisc noqueue state DOWN mode DEFAULT\n    \
         bridge forward_delay 1500 mcast_snooping {} mcast_querier {}\n",
        u8::from(bridge.snooping),
        u8::from(bridge.querier),
    )
}

impl CommandRunner for FakeHost {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, LabError> {
        let mut state = self.state.borrow_mut();
        let command = request.command_line();
        state.calls.push(Call {
            command: command.clone(),
            privilege: request.privilege,
        });

        if request.privilege == Privilege::Elevated && state.elevation_denied {
            return Ok(ExecutionResult::failed(
                1,
                "sudo: a terminal is required to read the password\nsudo: a password is required",
            ));
        }
        if let Some((_, result)) = state
            .failures
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        {
            return Ok(result.clone());
        }

        let argv: Vec<&str> = request.argv.iter().map(String::as_str).collect();
        Ok(Self::simulate(&mut state, &argv))
    }
}
