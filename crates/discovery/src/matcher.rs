//! The matching engine reducing a task batch to per-container targets.

use std::collections::HashSet;

use regex::Regex;
use serde::Deserialize;

use crate::docker_label::DockerLabelMatcher;
use crate::error::Errors;
use crate::service::ServiceMatcher;
use crate::task::{ContainerDefinition, Task};
use crate::task_definition::TaskDefinitionMatcher;

/// Metrics path assumed when no rule or label overrides it.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum MatcherType {
    Service,
    TaskDefinition,
    DockerLabel,
}

impl MatcherType {
    /// Precedence order: earlier entries claim container ports first.
    pub fn ordered() -> [MatcherType; 3] {
        [
            MatcherType::Service,
            MatcherType::TaskDefinition,
            MatcherType::DockerLabel,
        ]
    }
}

/// Exporter knobs shared by every matcher config, flattened into each rule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommonExporterConfig {
    pub job_name: String,
    pub metrics_path: String,
    pub metrics_ports: Vec<u16>,
}

impl CommonExporterConfig {
    pub(crate) fn validate_ports(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for port in &self.metrics_ports {
            if !seen.insert(port) {
                anyhow::bail!("metrics_ports has duplicated port {port}");
            }
        }
        Ok(())
    }
}

/// One scrape target claimed on a container.
///
/// `port` is the container port; the exporter resolves the host port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedTarget {
    pub matcher_type: MatcherType,
    pub matcher_index: usize,
    pub port: u16,
    /// Empty when the rule does not override the metrics path.
    pub metrics_path: String,
    pub job: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedContainer {
    pub task_index: usize,
    pub container_index: usize,
    pub targets: Vec<MatchedTarget>,
}

impl MatchedContainer {
    /// Append targets for ports nobody claimed yet; already-claimed ports
    /// keep their existing target.
    pub fn merge_targets(&mut self, incoming: Vec<MatchedTarget>) {
        for target in incoming {
            if self.targets.iter().any(|t| t.port == target.port) {
                continue;
            }
            self.targets.push(target);
        }
    }
}

/// Output of one matcher over a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchResult {
    /// Distinct task indices with at least one matched container, in scan
    /// order.
    pub tasks: Vec<usize>,
    pub containers: Vec<MatchedContainer>,
}

/// Outcome of matching one container. Not claiming a container is a signal,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Targets(Vec<MatchedTarget>),
    NotMatched,
}

/// Real per-container matching failure; the batch scan continues past it.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error(
        "container {container}: port label {label} has value {value:?}, expected a positive integer"
    )]
    InvalidPortLabel {
        container: String,
        label: String,
        value: String,
    },
}

pub enum Matcher {
    Service(ServiceMatcher),
    TaskDefinition(TaskDefinitionMatcher),
    DockerLabel(DockerLabelMatcher),
}

impl Matcher {
    pub fn matcher_type(&self) -> MatcherType {
        match self {
            Matcher::Service(_) => MatcherType::Service,
            Matcher::TaskDefinition(_) => MatcherType::TaskDefinition,
            Matcher::DockerLabel(_) => MatcherType::DockerLabel,
        }
    }

    pub fn match_targets(
        &self,
        task: &Task,
        container: &ContainerDefinition,
    ) -> Result<MatchOutcome, MatchError> {
        match self {
            Matcher::Service(m) => m.match_targets(task, container),
            Matcher::TaskDefinition(m) => m.match_targets(task, container),
            Matcher::DockerLabel(m) => m.match_targets(task, container),
        }
    }
}

/// Emit one target per container port that appears in the configured
/// metrics ports, after the optional container-name gate. Shared by the
/// service and task-definition matchers.
///
/// A container passing the gate is matched even when nothing intersects;
/// the empty target list keeps it visible in the match result. Whether an
/// emitted port resolves to a reachable host port is the exporter's
/// problem.
pub(crate) fn match_container_targets(
    container_name_regex: Option<&Regex>,
    common: &CommonExporterConfig,
    matcher_type: MatcherType,
    container: &ContainerDefinition,
) -> MatchOutcome {
    if let Some(regex) = container_name_regex {
        if !regex.is_match(&container.name) {
            return MatchOutcome::NotMatched;
        }
    }
    let targets = container
        .port_mappings
        .iter()
        .filter(|mapping| common.metrics_ports.contains(&mapping.container_port))
        .map(|mapping| MatchedTarget {
            matcher_type,
            matcher_index: 0,
            port: mapping.container_port,
            metrics_path: common.metrics_path.clone(),
            job: common.job_name.clone(),
        })
        .collect();
    MatchOutcome::Targets(targets)
}

/// Run one matcher over a whole batch.
///
/// Always returns a usable result; per-container failures land in the error
/// aggregate and the scan continues, a single container with a malformed
/// label must not take out the batch.
pub fn match_containers(
    tasks: &[Task],
    matcher: &Matcher,
    matcher_index: usize,
) -> (MatchResult, Errors) {
    let mut result = MatchResult::default();
    let mut errs = Errors::new();
    for (task_index, task) in tasks.iter().enumerate() {
        let mut task_matched = false;
        for (container_index, container) in
            task.definition.container_definitions.iter().enumerate()
        {
            match matcher.match_targets(task, container) {
                Ok(MatchOutcome::Targets(mut targets)) => {
                    for target in &mut targets {
                        target.matcher_index = matcher_index;
                    }
                    task_matched = true;
                    result.containers.push(MatchedContainer {
                        task_index,
                        container_index,
                        targets,
                    });
                }
                Ok(MatchOutcome::NotMatched) => {}
                Err(err) => errs.push(err),
            }
        }
        if task_matched {
            result.tasks.push(task_index);
        }
    }
    (result, errs)
}
