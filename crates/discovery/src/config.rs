//! Discovery configuration: parsing, validation and matcher construction.
//!
//! A config has two states: *raw* straight out of the parser, and
//! *initialised* after [`Config::init`] compiled the patterns and validated
//! the rules. Matcher construction rejects raw configs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

use crate::docker_label::DockerLabelConfig;
use crate::matcher::{Matcher, MatcherType};
use crate::service::ServiceConfig;
use crate::task_definition::TaskDefinitionConfig;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_JOB_LABEL_NAME: &str = "prometheus_job";
pub const DEFAULT_RESULT_FILE: &str = "/etc/ecs_sd_targets.yaml";
/// Environment variable the cluster region defaults from.
pub const AWS_REGION_ENV_KEY: &str = "AWS_REGION";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target ECS cluster name.
    pub cluster_name: String,
    /// AWS region of the cluster; defaults from `AWS_REGION`.
    pub cluster_region: String,
    /// How often the cluster is polled, as a human duration (`30s`, `1m`).
    #[serde(deserialize_with = "deserialize_from_humantime")]
    pub refresh_interval: Duration,
    /// Output path of the discovered targets YAML document.
    pub result_file: PathBuf,
    /// Label the job value is written under. The literal `job` is rejected
    /// because scrapers assign that label themselves.
    pub job_label_name: String,
    /// Rules matching tasks by the service that owns them.
    pub services: Vec<ServiceConfig>,
    /// Rules matching tasks by task definition ARN.
    pub task_definitions: Vec<TaskDefinitionConfig>,
    /// Rules matching containers by docker label.
    pub docker_labels: Vec<DockerLabelConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_name: String::new(),
            cluster_region: std::env::var(AWS_REGION_ENV_KEY).unwrap_or_default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            result_file: PathBuf::from(DEFAULT_RESULT_FILE),
            job_label_name: DEFAULT_JOB_LABEL_NAME.to_string(),
            services: Vec::new(),
            task_definitions: Vec::new(),
            docker_labels: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a YAML document; defaults fill whatever it omits.
    pub fn load(yaml: &str) -> Result<Config> {
        serde_yaml::from_str(yaml).context("failed to parse discovery config")
    }

    pub fn load_from_file(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)
            .context(format!("failed to read config from {}", path.display()))?;
        Self::load(&raw)
    }

    /// Validate the top-level fields and compile every matcher config.
    /// Required once after parsing.
    pub fn init(&mut self) -> Result<()> {
        if self.cluster_name.is_empty() {
            anyhow::bail!("cluster_name is required");
        }
        if self.job_label_name == "job" {
            anyhow::bail!(
                "job_label_name must not be the literal `job`, scrapers assign that label themselves"
            );
        }
        if self.refresh_interval.is_zero() {
            anyhow::bail!("refresh_interval must be positive");
        }
        for (i, cfg) in self.services.iter_mut().enumerate() {
            cfg.init().context(format!("services[{i}]"))?;
        }
        for (i, cfg) in self.task_definitions.iter_mut().enumerate() {
            cfg.init().context(format!("task_definitions[{i}]"))?;
        }
        for (i, cfg) in self.docker_labels.iter_mut().enumerate() {
            cfg.init().context(format!("docker_labels[{i}]"))?;
        }
        Ok(())
    }

    /// Build the matcher table the filter runs, keyed by matcher type.
    pub fn matchers(&self) -> Result<HashMap<MatcherType, Vec<Matcher>>> {
        let mut matchers = HashMap::new();
        matchers.insert(
            MatcherType::Service,
            self.services
                .iter()
                .map(|cfg| cfg.new_matcher())
                .collect::<Result<Vec<_>>>()?,
        );
        matchers.insert(
            MatcherType::TaskDefinition,
            self.task_definitions
                .iter()
                .map(|cfg| cfg.new_matcher())
                .collect::<Result<Vec<_>>>()?,
        );
        matchers.insert(
            MatcherType::DockerLabel,
            self.docker_labels
                .iter()
                .map(|cfg| cfg.new_matcher())
                .collect::<Result<Vec<_>>>()?,
        );
        Ok(matchers)
    }
}

fn deserialize_from_humantime<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let v = String::deserialize(deserializer)?;
    humantime::parse_duration(&v).map_err(serde::de::Error::custom)
}
