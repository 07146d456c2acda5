//! Docker-label based matching.

use anyhow::Result;
use serde::Deserialize;

use crate::matcher::{
    CommonExporterConfig, MatchError, MatchOutcome, MatchedTarget, Matcher, MatcherType,
};
use crate::task::{ContainerDefinition, Task};

/// Rule claiming containers that carry a port in a docker label.
///
/// Unlike the other matchers this one gates on the container definition
/// alone: the presence of `port_label` claims the container and its value is
/// the metrics port, so `metrics_ports` is rejected on these configs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DockerLabelConfig {
    #[serde(flatten)]
    pub common: CommonExporterConfig,
    /// Label holding the metrics container port. An empty label name
    /// deactivates the rule.
    pub port_label: String,
    /// Label supplying the job name when `job_name` is not set on the rule.
    pub job_name_label: String,
    /// Label overriding the metrics path for a single container.
    pub metrics_path_label: String,
}

impl DockerLabelConfig {
    pub fn init(&mut self) -> Result<()> {
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if !self.common.metrics_ports.is_empty() {
            anyhow::bail!(
                "metrics_ports is not supported on docker_labels configs, the port comes from the {:?} label",
                self.port_label
            );
        }
        Ok(())
    }

    pub fn new_matcher(&self) -> Result<Matcher> {
        self.validate()?;
        Ok(Matcher::DockerLabel(DockerLabelMatcher {
            cfg: self.clone(),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct DockerLabelMatcher {
    cfg: DockerLabelConfig,
}

impl DockerLabelMatcher {
    pub(crate) fn match_targets(
        &self,
        _task: &Task,
        container: &ContainerDefinition,
    ) -> Result<MatchOutcome, MatchError> {
        if self.cfg.port_label.is_empty() {
            return Ok(MatchOutcome::NotMatched);
        }
        let Some(value) = container.docker_labels.get(&self.cfg.port_label) else {
            return Ok(MatchOutcome::NotMatched);
        };
        let port = value
            .parse::<u16>()
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| MatchError::InvalidPortLabel {
                container: container.name.clone(),
                label: self.cfg.port_label.clone(),
                value: value.clone(),
            })?;

        let metrics_path = match container.docker_labels.get(&self.cfg.metrics_path_label) {
            Some(path) if !self.cfg.metrics_path_label.is_empty() => path.clone(),
            _ => self.cfg.common.metrics_path.clone(),
        };
        // The rule-level job name wins over the label-sourced one.
        let job = if !self.cfg.common.job_name.is_empty() {
            self.cfg.common.job_name.clone()
        } else {
            container
                .docker_labels
                .get(&self.cfg.job_name_label)
                .filter(|_| !self.cfg.job_name_label.is_empty())
                .cloned()
                .unwrap_or_default()
        };

        Ok(MatchOutcome::Targets(vec![MatchedTarget {
            matcher_type: MatcherType::DockerLabel,
            matcher_index: 0,
            port,
            metrics_path,
            job,
        }]))
    }
}
