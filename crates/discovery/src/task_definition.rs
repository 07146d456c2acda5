//! Task-definition ARN based matching.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::matcher::{
    CommonExporterConfig, MatchError, MatchOutcome, Matcher, MatcherType, match_container_targets,
};
use crate::task::{ContainerDefinition, Task};

/// Rule claiming containers through their task definition ARN. Covers tasks
/// launched outside any service, which the service matcher can never reach.
///
/// `arn_pattern` is mandatory; an empty string deactivates the rule, so a
/// container-name pattern on its own never matches.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskDefinitionConfig {
    #[serde(flatten)]
    pub common: CommonExporterConfig,
    pub arn_pattern: String,
    pub container_name_pattern: String,

    #[serde(skip)]
    pub(crate) arn_regex: Option<Regex>,
    #[serde(skip)]
    pub(crate) container_name_regex: Option<Regex>,
}

impl TaskDefinitionConfig {
    /// Compile the patterns and validate the exporter block. A config is
    /// usable by [`TaskDefinitionConfig::new_matcher`] only after this
    /// succeeded.
    pub fn init(&mut self) -> Result<()> {
        self.common.validate_ports()?;
        if self.arn_pattern.is_empty() {
            return Ok(());
        }
        self.arn_regex = Some(Regex::new(&self.arn_pattern).context("invalid arn pattern")?);
        if !self.container_name_pattern.is_empty() {
            self.container_name_regex = Some(
                Regex::new(&self.container_name_pattern)
                    .context("invalid container name pattern")?,
            );
        }
        Ok(())
    }

    pub fn new_matcher(&self) -> Result<Matcher> {
        if !self.arn_pattern.is_empty() && self.arn_regex.is_none() {
            anyhow::bail!(
                "task definition config with pattern {:?} used before init",
                self.arn_pattern
            );
        }
        Ok(Matcher::TaskDefinition(TaskDefinitionMatcher {
            cfg: self.clone(),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct TaskDefinitionMatcher {
    cfg: TaskDefinitionConfig,
}

impl TaskDefinitionMatcher {
    pub(crate) fn match_targets(
        &self,
        task: &Task,
        container: &ContainerDefinition,
    ) -> Result<MatchOutcome, MatchError> {
        let Some(arn_regex) = &self.cfg.arn_regex else {
            return Ok(MatchOutcome::NotMatched);
        };
        if !arn_regex.is_match(&task.task_definition_arn) {
            return Ok(MatchOutcome::NotMatched);
        }
        // The rest is identical to the service matcher.
        Ok(match_container_targets(
            self.cfg.container_name_regex.as_ref(),
            &self.cfg.common,
            MatcherType::TaskDefinition,
            container,
        ))
    }
}
