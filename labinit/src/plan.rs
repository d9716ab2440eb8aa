//! The fixed, ordered phase plan for bootstrapping the lab.
//!
//! Order and required/best-effort classification are the principal state
//! machine of the orchestrator:
//!
//! | Phase                          | Policy      |
//! |--------------------------------|-------------|
//! | Dependency provisioning        | required    |
//! | Permission repair              | required    |
//! | Network fabric setup           | required    |
//! | Credential provisioning        | required    |
//! | Time synchronization           | best-effort |
//! | Configuration generation       | required    |
//! | Docker network reconciliation  | required    |
//! | Monitoring provisioning        | required    |
//! | Topology deployment            | required    |
//! | Host routing                   | best-effort |
//! | Health verification            | best-effort |

use std::path::Path;

use crate::core::classify::bridge_flags;
use crate::core::types::ExecutionRequest;
use crate::io::artifact::monitoring_artifacts;
use crate::io::config::RouteConfig;
use crate::io::resolver::OrchestrationContext;
use crate::step::{Phase, Step};
use crate::steps::{
    AlwaysRun, EnsureResource, Locale, Packages, RequiredInput, SettleThenProbe, SshKey,
    WhenPresent, WriteArtifacts,
};

pub const DEPENDENCIES: &str = "Dependency provisioning";
pub const PERMISSIONS: &str = "Permission repair";
pub const NETWORK_FABRIC: &str = "Network fabric setup";
pub const CREDENTIALS: &str = "Credential provisioning";
pub const TIME_SYNC: &str = "Time synchronization";
pub const CONFIG_GENERATION: &str = "Configuration generation";
pub const DOCKER_NETWORK: &str = "Docker network reconciliation";
pub const MONITORING: &str = "Monitoring provisioning";
pub const TOPOLOGY: &str = "Topology deployment";
pub const HOST_ROUTING: &str = "Host routing";
pub const HEALTH: &str = "Health verification";

/// Build every phase, in execution order, for `ctx`.
pub fn build_phases(ctx: &OrchestrationContext) -> Vec<Phase> {
    let paths = &ctx.paths;
    let cfg = &ctx.config;
    vec![
        Phase::new(
            DEPENDENCIES,
            vec![
                Step::required(
                    "acquire-privilege",
                    AlwaysRun::new(vec![ExecutionRequest::new(["true"]).elevated().captured()]),
                ),
                Step::required(
                    "install-packages",
                    Packages {
                        names: cfg.packages.clone(),
                    },
                ),
                Step::required(
                    "provision-locale",
                    Locale {
                        name: cfg.locale.clone(),
                    },
                ),
            ],
        ),
        Phase::new(
            PERMISSIONS,
            vec![
                Step::required(
                    "repair-zbx-env",
                    WhenPresent {
                        path: paths.zbx_env_dir.clone(),
                        commands: vec![chmod_recursive("777", &paths.zbx_env_dir)],
                    },
                ),
                Step::required(
                    "remove-stale-postgres-pid",
                    WhenPresent {
                        path: paths.postgres_pid_file.clone(),
                        commands: vec![
                            ExecutionRequest::new([
                                "rm",
                                "-f",
                                path_arg(&paths.postgres_pid_file).as_str(),
                            ])
                            .elevated(),
                        ],
                    },
                ),
                Step::required(
                    "repair-device-configs",
                    WhenPresent {
                        path: paths.device_configs_dir.clone(),
                        commands: vec![chmod_recursive("777", &paths.device_configs_dir)],
                    },
                ),
            ],
        ),
        Phase::new(
            NETWORK_FABRIC,
            cfg.bridges
                .iter()
                .map(|name| Step::required(format!("ensure-bridge:{name}"), ensure_bridge(name)))
                .collect(),
        ),
        Phase::new(
            CREDENTIALS,
            vec![Step::required(
                "ssh-key",
                SshKey {
                    path: paths.ssh_key.clone(),
                },
            )],
        ),
        Phase::new(
            TIME_SYNC,
            vec![Step::best_effort(
                "restart-time-sync",
                AlwaysRun::new(vec![
                    ExecutionRequest::new(["service", cfg.time_sync_service.as_str(), "restart"])
                        .elevated()
                        .captured(),
                ]),
            )],
        ),
        Phase::new(
            CONFIG_GENERATION,
            vec![Step::required(
                "render-device-configs",
                AlwaysRun::new(vec![ExecutionRequest::new([
                    ctx.tools.ansible_playbook.clone(),
                    "-i".to_string(),
                    path_arg(&paths.inventory_file),
                    path_arg(&paths.playbook_file),
                ])])
                .with_input(RequiredInput::new(&paths.inventory_file, "inventory"))
                .with_input(RequiredInput::new(&paths.playbook_file, "playbook")),
            )],
        ),
        Phase::new(
            DOCKER_NETWORK,
            vec![Step::required(
                format!("ensure-docker-network:{}", cfg.docker_network.name),
                ensure_docker_network(&cfg.docker_network.name, &cfg.docker_network.subnet),
            )],
        ),
        Phase::new(
            MONITORING,
            vec![
                Step::required(
                    "write-provisioning-files",
                    WriteArtifacts {
                        artifacts: monitoring_artifacts(paths),
                    },
                ),
                Step::required(
                    "start-monitoring-stack",
                    AlwaysRun::new(vec![
                        ExecutionRequest::new([
                            "docker".to_string(),
                            "compose".to_string(),
                            "-f".to_string(),
                            path_arg(&paths.compose_file),
                            "up".to_string(),
                            "-d".to_string(),
                        ])
                        .elevated(),
                    ])
                    .with_input(RequiredInput::new(&paths.compose_file, "monitoring compose file")),
                ),
            ],
        ),
        Phase::new(
            TOPOLOGY,
            vec![
                Step::required(
                    "reset-device-config-permissions",
                    WhenPresent {
                        path: paths.device_configs_dir.clone(),
                        commands: vec![chmod_recursive("755", &paths.device_configs_dir)],
                    },
                ),
                Step::required(
                    "deploy-topology",
                    AlwaysRun::new(vec![
                        ExecutionRequest::new([
                            "containerlab".to_string(),
                            "deploy".to_string(),
                            "-t".to_string(),
                            path_arg(&paths.topology_file),
                            "--reconfigure".to_string(),
                        ])
                        .elevated(),
                    ])
                    .with_input(RequiredInput::new(&paths.topology_file, "topology")),
                ),
            ],
        ),
        Phase::new(
            HOST_ROUTING,
            cfg.routes
                .iter()
                .map(|route| {
                    Step::best_effort(format!("add-route:{}", route.container), add_route(route))
                })
                .collect(),
        ),
        Phase::new(
            HEALTH,
            vec![Step::best_effort(
                "probe-devices",
                SettleThenProbe {
                    probe: ExecutionRequest::new([
                        ctx.tools.ansible.clone(),
                        cfg.probe_group.clone(),
                        "-i".to_string(),
                        path_arg(&paths.inventory_file),
                        "-m".to_string(),
                        "ping".to_string(),
                    ]),
                },
            )],
        ),
    ]
}

/// Bridge with multicast snooping and querier enabled, brought up.
///
/// An existing bridge that is down or missing either multicast option is
/// configured in place.
pub fn ensure_bridge(name: &str) -> EnsureResource {
    EnsureResource::new(
        ExecutionRequest::probe(["ip", "-d", "link", "show", name]),
        vec![ExecutionRequest::new(["ip", "link", "add", name, "type", "bridge"]).elevated()],
    )
    .configured_by(
        vec![
            ExecutionRequest::new([
                "ip",
                "link",
                "set",
                "dev",
                name,
                "type",
                "bridge",
                "mcast_snooping",
                "1",
                "mcast_querier",
                "1",
            ])
            .elevated(),
            ExecutionRequest::new(["ip", "link", "set", "dev", name, "up"]).elevated(),
        ],
        |listing| bridge_flags(listing).converged(),
    )
}

/// Isolated container network with a fixed subnet.
pub fn ensure_docker_network(name: &str, subnet: &str) -> EnsureResource {
    EnsureResource::new(
        ExecutionRequest::probe(["docker", "network", "inspect", name]).elevated(),
        vec![
            ExecutionRequest::new(["docker", "network", "create", "--subnet", subnet, name])
                .elevated(),
        ],
    )
}

fn add_route(route: &RouteConfig) -> AlwaysRun {
    AlwaysRun::new(vec![
        ExecutionRequest::new([
            "docker",
            "exec",
            route.container.as_str(),
            "ip",
            "route",
            "add",
            route.destination.as_str(),
            "via",
            route.gateway.as_str(),
        ])
        .elevated()
        .captured(),
    ])
}

fn chmod_recursive(mode: &str, path: &Path) -> ExecutionRequest {
    ExecutionRequest::new([
        "chmod".to_string(),
        "-R".to_string(),
        mode.to_string(),
        path_arg(path),
    ])
    .elevated()
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}
