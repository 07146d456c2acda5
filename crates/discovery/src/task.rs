//! Task model shared by the fetcher, the filter and the exporter.
//!
//! These are plain serde values owned by this crate; fetcher implementations
//! map whatever their orchestrator client returns into them. A batch of
//! tasks lives for exactly one discovery tick: the fetcher builds it, the
//! filter annotates it in place, the exporter reads it, then it is dropped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::matcher::MatchedContainer;

/// Attachment type carrying the task network interface in awsvpc mode.
pub const ENI_ATTACHMENT_TYPE: &str = "ElasticNetworkInterface";
/// Attachment detail holding the interface's private IPv4 address.
pub const PRIVATE_IPV4_DETAIL: &str = "privateIPv4Address";

/// ECS task network mode. A definition that omits the mode is treated as
/// `bridge`, the default for EC2 launches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Bridge,
    Awsvpc,
    Host,
    None,
    /// Any mode string this crate does not know about.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: Option<u16>,
}

/// Container spec from the task definition. Matching runs against these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerDefinition {
    pub name: String,
    pub docker_labels: HashMap<String, String>,
    pub port_mappings: Vec<PortMapping>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDefinition {
    pub family: String,
    pub revision: i64,
    pub network_mode: NetworkMode,
    pub container_definitions: Vec<ContainerDefinition>,
}

/// Post-scheduling port binding on a running container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkBinding {
    pub container_port: u16,
    pub host_port: u16,
}

/// Running container on a task, as opposed to its definition. Bridge-mode
/// port resolution needs its network bindings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeContainer {
    pub name: String,
    pub network_bindings: Vec<NetworkBinding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentDetail {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub attachment_type: String,
    pub details: Vec<AttachmentDetail>,
}

/// The ECS service owning a task, when the fetcher resolved one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    pub name: String,
}

/// The EC2 instance a task runs on. Absent for Fargate tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Ec2Instance {
    pub instance_id: String,
    pub instance_type: String,
    pub private_ip: String,
    pub public_ip: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub tags: HashMap<String, String>,
}

/// One running task, decorated by the fetcher with everything the pipeline
/// needs: its definition, runtime containers, service and host instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub arn: String,
    pub task_definition_arn: String,
    pub started_by: String,
    pub launch_type: String,
    pub group: String,
    pub health_status: String,
    pub tags: HashMap<String, String>,
    pub containers: Vec<RuntimeContainer>,
    pub attachments: Vec<Attachment>,
    pub definition: TaskDefinition,
    pub service: Option<Service>,
    pub ec2: Option<Ec2Instance>,
    /// Filled in by the filter, one entry per matched container definition.
    #[serde(skip)]
    pub matched: Vec<MatchedContainer>,
}

/// Why a task, or one of its targets, could not be exported.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("task {arn} has no private ip in network mode {mode}")]
    PrivateIpNotFound { arn: String, mode: NetworkMode },
    #[error("task {arn} has unsupported network mode")]
    UnsupportedNetworkMode { arn: String },
    #[error("no runtime container named {container} on task {arn}")]
    RuntimeContainerNotFound { arn: String, container: String },
    #[error(
        "container {container} on task {arn} has no host binding for container port {port}"
    )]
    PortNotMapped {
        arn: String,
        container: String,
        port: u16,
    },
}

impl Task {
    /// The private IP every target in this task shares.
    ///
    /// awsvpc tasks carry it on their network-interface attachment; bridge
    /// and host tasks use the instance's private IP.
    pub fn private_ip(&self) -> Result<&str, ExportError> {
        let mode = self.definition.network_mode;
        match mode {
            NetworkMode::Bridge | NetworkMode::Host => self
                .ec2
                .as_ref()
                .map(|ec2| ec2.private_ip.as_str())
                .filter(|ip| !ip.is_empty())
                .ok_or_else(|| ExportError::PrivateIpNotFound {
                    arn: self.arn.clone(),
                    mode,
                }),
            NetworkMode::Awsvpc => {
                for attachment in &self.attachments {
                    if attachment.attachment_type != ENI_ATTACHMENT_TYPE {
                        continue;
                    }
                    for detail in &attachment.details {
                        if detail.name == PRIVATE_IPV4_DETAIL && !detail.value.is_empty() {
                            return Ok(&detail.value);
                        }
                    }
                }
                Err(ExportError::PrivateIpNotFound {
                    arn: self.arn.clone(),
                    mode,
                })
            }
            NetworkMode::None => Err(ExportError::PrivateIpNotFound {
                arn: self.arn.clone(),
                mode,
            }),
            NetworkMode::Unknown => Err(ExportError::UnsupportedNetworkMode {
                arn: self.arn.clone(),
            }),
        }
    }

    /// The host port a container port is reachable on.
    ///
    /// Identity in awsvpc and host mode; in bridge mode the scheduler picks
    /// the host port, so it is looked up on the runtime container's network
    /// bindings.
    pub fn mapped_port(
        &self,
        container: &ContainerDefinition,
        container_port: u16,
    ) -> Result<u16, ExportError> {
        match self.definition.network_mode {
            NetworkMode::Awsvpc | NetworkMode::Host => Ok(container_port),
            NetworkMode::Bridge => {
                let runtime = self
                    .containers
                    .iter()
                    .find(|c| c.name == container.name)
                    .ok_or_else(|| ExportError::RuntimeContainerNotFound {
                        arn: self.arn.clone(),
                        container: container.name.clone(),
                    })?;
                runtime
                    .network_bindings
                    .iter()
                    .find(|b| b.container_port == container_port)
                    .map(|b| b.host_port)
                    .ok_or_else(|| ExportError::PortNotMapped {
                        arn: self.arn.clone(),
                        container: container.name.clone(),
                        port: container_port,
                    })
            }
            NetworkMode::None | NetworkMode::Unknown => {
                Err(ExportError::UnsupportedNetworkMode {
                    arn: self.arn.clone(),
                })
            }
        }
    }

    /// Merge a matcher result into this task's matched list.
    ///
    /// Containers merge by container index. Within a container a port
    /// already claimed by an earlier matcher keeps its target; the incoming
    /// one is dropped. The filter applies results in precedence order, which
    /// makes this the whole precedence mechanism.
    pub fn add_matched_container(&mut self, incoming: MatchedContainer) {
        for existing in &mut self.matched {
            if existing.container_index == incoming.container_index {
                existing.merge_targets(incoming.targets);
                return;
            }
        }
        self.matched.push(incoming);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatchedTarget, MatcherType};

    fn target(matcher_type: MatcherType, port: u16, metrics_path: &str) -> MatchedTarget {
        MatchedTarget {
            matcher_type,
            matcher_index: 0,
            port,
            metrics_path: metrics_path.to_string(),
            job: String::new(),
        }
    }

    #[test]
    fn test_add_matched_container_appends_new_container() {
        let mut task = Task {
            matched: vec![MatchedContainer {
                task_index: 0,
                container_index: 0,
                targets: vec![target(MatcherType::Service, 1, "")],
            }],
            ..Task::default()
        };

        task.add_matched_container(MatchedContainer {
            task_index: 0,
            container_index: 1,
            targets: vec![target(MatcherType::DockerLabel, 2, "")],
        });

        assert_eq!(task.matched.len(), 2);
        assert_eq!(task.matched[1].container_index, 1);
        assert_eq!(task.matched[1].targets[0].port, 2);
    }

    #[test]
    fn test_add_matched_container_drops_claimed_port() {
        let mut task = Task {
            matched: vec![MatchedContainer {
                task_index: 0,
                container_index: 0,
                targets: vec![target(MatcherType::Service, 1, "")],
            }],
            ..Task::default()
        };

        // Same container, same port, different metrics path: the earlier
        // matcher keeps the port.
        task.add_matched_container(MatchedContainer {
            task_index: 0,
            container_index: 0,
            targets: vec![target(MatcherType::TaskDefinition, 1, "/metrics2")],
        });

        assert_eq!(task.matched.len(), 1);
        assert_eq!(
            task.matched[0].targets,
            vec![target(MatcherType::Service, 1, "")]
        );
    }

    #[test]
    fn test_add_matched_container_merges_new_port() {
        let mut task = Task {
            matched: vec![MatchedContainer {
                task_index: 0,
                container_index: 0,
                targets: vec![target(MatcherType::Service, 1, "")],
            }],
            ..Task::default()
        };

        task.add_matched_container(MatchedContainer {
            task_index: 0,
            container_index: 0,
            targets: vec![target(MatcherType::TaskDefinition, 3, "")],
        });

        assert_eq!(task.matched.len(), 1);
        assert_eq!(task.matched[0].targets.len(), 2);
        assert_eq!(task.matched[0].targets[1].port, 3);
        assert_eq!(
            task.matched[0].targets[1].matcher_type,
            MatcherType::TaskDefinition
        );
    }

    #[test]
    fn test_private_ip_awsvpc() {
        let task = Task {
            arn: "t1".to_string(),
            definition: TaskDefinition {
                network_mode: NetworkMode::Awsvpc,
                ..TaskDefinition::default()
            },
            attachments: vec![Attachment {
                attachment_type: ENI_ATTACHMENT_TYPE.to_string(),
                details: vec![AttachmentDetail {
                    name: PRIVATE_IPV4_DETAIL.to_string(),
                    value: "172.168.1.1".to_string(),
                }],
            }],
            ..Task::default()
        };
        assert_eq!(task.private_ip().unwrap(), "172.168.1.1");
    }

    #[test]
    fn test_private_ip_awsvpc_missing_attachment() {
        let task = Task {
            arn: "t1".to_string(),
            definition: TaskDefinition {
                network_mode: NetworkMode::Awsvpc,
                ..TaskDefinition::default()
            },
            ..Task::default()
        };
        assert!(matches!(
            task.private_ip(),
            Err(ExportError::PrivateIpNotFound { .. })
        ));
    }

    #[test]
    fn test_private_ip_bridge_uses_instance() {
        let task = Task {
            arn: "t1".to_string(),
            ec2: Some(Ec2Instance {
                private_ip: "172.168.0.1".to_string(),
                ..Ec2Instance::default()
            }),
            ..Task::default()
        };
        assert_eq!(task.private_ip().unwrap(), "172.168.0.1");
    }

    #[test]
    fn test_private_ip_none_mode_fails() {
        let task = Task {
            arn: "t1".to_string(),
            definition: TaskDefinition {
                network_mode: NetworkMode::None,
                ..TaskDefinition::default()
            },
            ..Task::default()
        };
        assert!(task.private_ip().is_err());
    }

    #[test]
    fn test_mapped_port_identity_modes() {
        for mode in [NetworkMode::Awsvpc, NetworkMode::Host] {
            let task = Task {
                definition: TaskDefinition {
                    network_mode: mode,
                    ..TaskDefinition::default()
                },
                ..Task::default()
            };
            let container = ContainerDefinition {
                name: "c1".to_string(),
                ..ContainerDefinition::default()
            };
            assert_eq!(task.mapped_port(&container, 2112).unwrap(), 2112);
        }
    }

    #[test]
    fn test_mapped_port_bridge() {
        let task = Task {
            arn: "t1".to_string(),
            containers: vec![RuntimeContainer {
                name: "c1".to_string(),
                network_bindings: vec![NetworkBinding {
                    container_port: 1008,
                    host_port: 8008,
                }],
            }],
            ..Task::default()
        };
        let container = ContainerDefinition {
            name: "c1".to_string(),
            ..ContainerDefinition::default()
        };
        assert_eq!(task.mapped_port(&container, 1008).unwrap(), 8008);
        assert!(matches!(
            task.mapped_port(&container, 1009),
            Err(ExportError::PortNotMapped { port: 1009, .. })
        ));
    }

    #[test]
    fn test_mapped_port_bridge_without_runtime_container() {
        let task = Task {
            arn: "t1".to_string(),
            ..Task::default()
        };
        let container = ContainerDefinition {
            name: "c1".to_string(),
            ..ContainerDefinition::default()
        };
        assert!(matches!(
            task.mapped_port(&container, 1008),
            Err(ExportError::RuntimeContainerNotFound { .. })
        ));
    }

    #[test]
    fn test_network_mode_parses_unknown() {
        let mode: NetworkMode = serde_json::from_str("\"sriov\"").unwrap();
        assert_eq!(mode, NetworkMode::Unknown);
        let mode: NetworkMode = serde_json::from_str("\"awsvpc\"").unwrap();
        assert_eq!(mode, NetworkMode::Awsvpc);
    }
}
