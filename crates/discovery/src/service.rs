//! Service-name based matching.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::matcher::{
    CommonExporterConfig, MatchError, MatchOutcome, Matcher, MatcherType, match_container_targets,
};
use crate::task::{ContainerDefinition, Task};

/// Rule claiming containers through the ECS service that owns their task.
///
/// `name_pattern` is mandatory; an empty string deactivates the rule, so a
/// container-name pattern on its own never matches. When
/// `container_name_pattern` is set both patterns must match.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    #[serde(flatten)]
    pub common: CommonExporterConfig,
    pub name_pattern: String,
    pub container_name_pattern: String,

    #[serde(skip)]
    pub(crate) name_regex: Option<Regex>,
    #[serde(skip)]
    pub(crate) container_name_regex: Option<Regex>,
}

impl ServiceConfig {
    /// Compile the patterns and validate the exporter block. A config is
    /// usable by [`ServiceConfig::new_matcher`] only after this succeeded.
    pub fn init(&mut self) -> Result<()> {
        self.common.validate_ports()?;
        if self.name_pattern.is_empty() {
            return Ok(());
        }
        self.name_regex = Some(
            Regex::new(&self.name_pattern).context("invalid service name pattern")?,
        );
        if !self.container_name_pattern.is_empty() {
            self.container_name_regex = Some(
                Regex::new(&self.container_name_pattern)
                    .context("invalid container name pattern")?,
            );
        }
        Ok(())
    }

    pub fn new_matcher(&self) -> Result<Matcher> {
        if !self.name_pattern.is_empty() && self.name_regex.is_none() {
            anyhow::bail!("service config with pattern {:?} used before init", self.name_pattern);
        }
        Ok(Matcher::Service(ServiceMatcher { cfg: self.clone() }))
    }
}

#[derive(Debug, Clone)]
pub struct ServiceMatcher {
    cfg: ServiceConfig,
}

impl ServiceMatcher {
    pub(crate) fn match_targets(
        &self,
        task: &Task,
        container: &ContainerDefinition,
    ) -> Result<MatchOutcome, MatchError> {
        let Some(name_regex) = &self.cfg.name_regex else {
            return Ok(MatchOutcome::NotMatched);
        };
        // Tasks without a resolved service cannot match by service name.
        let Some(service) = &task.service else {
            return Ok(MatchOutcome::NotMatched);
        };
        if !name_regex.is_match(&service.name) {
            return Ok(MatchOutcome::NotMatched);
        }
        Ok(match_container_targets(
            self.cfg.container_name_regex.as_ref(),
            &self.cfg.common,
            MatcherType::Service,
            container,
        ))
    }
}

/// Predicate fetchers use to skip describing services no rule cares about.
pub type ServiceNameFilter = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Combine all configured service name patterns into one predicate. With no
/// configured patterns the predicate rejects every name.
pub fn service_configs_to_filter(cfgs: &[ServiceConfig]) -> Result<ServiceNameFilter> {
    let mut regexes = Vec::new();
    for cfg in cfgs {
        if cfg.name_pattern.is_empty() {
            continue;
        }
        regexes.push(
            Regex::new(&cfg.name_pattern).context("invalid service name pattern")?,
        );
    }
    Ok(Box::new(move |name| {
        regexes.iter().any(|r| r.is_match(name))
    }))
}
