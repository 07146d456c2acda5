//! Prometheus file_sd rendering of exported targets.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const METRICS_PATH_LABEL: &str = "__metrics_path__";

const META_PREFIX: &str = "__meta_ecs_";

/// Scrape target record for one container port on one task.
///
/// Optional string fields are empty when the source task did not carry the
/// attribute; empty values are dropped at label rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrometheusTarget {
    pub source: String,
    /// `ip:host_port`, resolved by the exporter.
    pub address: String,
    pub metrics_path: String,
    pub job: String,
    pub cluster_name: String,
    pub service_name: String,
    pub task_definition_family: String,
    pub task_definition_revision: i64,
    pub task_started_by: String,
    pub task_launch_type: String,
    pub task_group: String,
    pub task_tags: BTreeMap<String, String>,
    pub health_status: String,
    pub container_name: String,
    pub container_labels: BTreeMap<String, String>,
    pub ec2_instance_id: String,
    pub ec2_instance_type: String,
    pub ec2_tags: BTreeMap<String, String>,
    pub ec2_vpc_id: String,
    pub ec2_subnet_id: String,
    pub ec2_private_ip: String,
    pub ec2_public_ip: String,
}

impl PrometheusTarget {
    /// Render everything but the address as Prometheus labels.
    ///
    /// The job value is written under `job_label_name` because the literal
    /// `job` label collides with the one scrapers assign themselves.
    pub fn prom_labels(&self, job_label_name: &str) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        insert_non_empty(&mut labels, METRICS_PATH_LABEL, &self.metrics_path);
        insert_non_empty(&mut labels, job_label_name, &self.job);

        insert_meta(&mut labels, "source", &self.source);
        insert_meta(&mut labels, "cluster_name", &self.cluster_name);
        insert_meta(&mut labels, "service_name", &self.service_name);
        insert_meta(
            &mut labels,
            "task_definition_family",
            &self.task_definition_family,
        );
        if self.task_definition_revision > 0 {
            labels.insert(
                format!("{META_PREFIX}task_definition_revision"),
                self.task_definition_revision.to_string(),
            );
        }
        insert_meta(&mut labels, "task_started_by", &self.task_started_by);
        insert_meta(&mut labels, "task_launch_type", &self.task_launch_type);
        insert_meta(&mut labels, "task_group", &self.task_group);
        insert_meta(&mut labels, "health_status", &self.health_status);
        insert_meta(&mut labels, "container_name", &self.container_name);
        for (key, value) in &self.task_tags {
            labels.insert(
                format!("{META_PREFIX}task_tags_{}", sanitize_label(key)),
                value.clone(),
            );
        }
        for (key, value) in &self.container_labels {
            labels.insert(
                format!("{META_PREFIX}container_labels_{}", sanitize_label(key)),
                value.clone(),
            );
        }

        insert_meta(&mut labels, "ec2_instance_id", &self.ec2_instance_id);
        insert_meta(&mut labels, "ec2_instance_type", &self.ec2_instance_type);
        insert_meta(&mut labels, "ec2_vpc_id", &self.ec2_vpc_id);
        insert_meta(&mut labels, "ec2_subnet_id", &self.ec2_subnet_id);
        insert_meta(&mut labels, "ec2_private_ip", &self.ec2_private_ip);
        insert_meta(&mut labels, "ec2_public_ip", &self.ec2_public_ip);
        for (key, value) in &self.ec2_tags {
            labels.insert(
                format!("{META_PREFIX}ec2_tags_{}", sanitize_label(key)),
                value.clone(),
            );
        }
        labels
    }
}

fn insert_non_empty(labels: &mut BTreeMap<String, String>, key: &str, value: &str) {
    if !value.is_empty() {
        labels.insert(key.to_string(), value.to_string());
    }
}

fn insert_meta(labels: &mut BTreeMap<String, String>, key: &str, value: &str) {
    if !value.is_empty() {
        labels.insert(format!("{META_PREFIX}{key}"), value.to_string());
    }
}

/// Replace characters outside the Prometheus label charset
/// (`[a-zA-Z_][a-zA-Z0-9_]*`) with underscores.
pub fn sanitize_label(name: &str) -> String {
    name.chars()
        .enumerate()
        .map(|(i, c)| {
            if c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// One file_sd group: all the addresses sharing one label set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

/// Group targets by identical label set.
///
/// Addresses within a group and the groups themselves come out sorted, so
/// the same target list always renders to the same document.
pub fn targets_to_file_sd(
    targets: &[PrometheusTarget],
    job_label_name: &str,
) -> Vec<TargetGroup> {
    let mut groups: BTreeMap<BTreeMap<String, String>, BTreeSet<String>> = BTreeMap::new();
    for target in targets {
        groups
            .entry(target.prom_labels(job_label_name))
            .or_default()
            .insert(target.address.clone());
    }
    groups
        .into_iter()
        .map(|(labels, addresses)| TargetGroup {
            targets: addresses.into_iter().collect(),
            labels,
        })
        .collect()
}

/// Serialise the grouped targets to the YAML document scrapers reload.
pub fn targets_to_file_sd_yaml(
    targets: &[PrometheusTarget],
    job_label_name: &str,
) -> Result<String> {
    serde_yaml::to_string(&targets_to_file_sd(targets, job_label_name))
        .context("failed to serialize scrape targets")
}
