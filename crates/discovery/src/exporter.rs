//! Converts annotated tasks into Prometheus scrape targets.

use crate::error::Errors;
use crate::matcher::DEFAULT_METRICS_PATH;
use crate::target::PrometheusTarget;
use crate::task::Task;

pub struct TaskExporter {
    cluster: String,
}

impl TaskExporter {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    /// Export every annotated task in a batch.
    ///
    /// Keeps going past errors: the returned targets are all valid even when
    /// the aggregate is non-empty, and the caller publishes the valid
    /// subset.
    pub fn export_tasks(&self, tasks: &[Task]) -> (Vec<PrometheusTarget>, Errors) {
        let mut all_targets = Vec::new();
        let mut errs = Errors::new();
        for task in tasks {
            let (targets, task_errs) = self.export_task(task);
            errs.extend(task_errs);
            all_targets.extend(targets);
        }
        (all_targets, errs)
    }

    /// Export all the matched containers of a single task.
    ///
    /// A missing private IP skips the whole task; an unresolvable port skips
    /// only that target.
    fn export_task(&self, task: &Task) -> (Vec<PrometheusTarget>, Errors) {
        let mut errs = Errors::new();
        // All targets in one task share the same IP.
        let ip = match task.private_ip() {
            Ok(ip) => ip.to_string(),
            Err(err) => {
                errs.push(err);
                return (Vec::new(), errs);
            }
        };

        let mut base = PrometheusTarget {
            source: task.arn.clone(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            cluster_name: self.cluster.clone(),
            task_definition_family: task.definition.family.clone(),
            task_definition_revision: task.definition.revision,
            task_started_by: task.started_by.clone(),
            task_launch_type: task.launch_type.clone(),
            task_group: task.group.clone(),
            task_tags: task.tags.clone().into_iter().collect(),
            health_status: task.health_status.clone(),
            ..PrometheusTarget::default()
        };
        if let Some(service) = &task.service {
            base.service_name = service.name.clone();
        }
        if let Some(ec2) = &task.ec2 {
            base.ec2_instance_id = ec2.instance_id.clone();
            base.ec2_instance_type = ec2.instance_type.clone();
            base.ec2_tags = ec2.tags.clone().into_iter().collect();
            base.ec2_vpc_id = ec2.vpc_id.clone();
            base.ec2_subnet_id = ec2.subnet_id.clone();
            base.ec2_private_ip = ip.clone();
            base.ec2_public_ip = ec2.public_ip.clone();
        }

        let mut targets = Vec::new();
        for matched in &task.matched {
            let Some(container) = task
                .definition
                .container_definitions
                .get(matched.container_index)
            else {
                errs.push(anyhow::anyhow!(
                    "task {} has no container definition at index {}",
                    task.arn,
                    matched.container_index
                ));
                continue;
            };
            let mut container_target = base.clone();
            container_target.container_name = container.name.clone();
            container_target.container_labels =
                container.docker_labels.clone().into_iter().collect();
            // One container can carry several targets, one per matched port.
            for matched_target in &matched.targets {
                let host_port = match task.mapped_port(container, matched_target.port) {
                    Ok(port) => port,
                    Err(err) => {
                        errs.push(err);
                        continue;
                    }
                };
                let mut target = container_target.clone();
                target.address = format!("{ip}:{host_port}");
                if !matched_target.metrics_path.is_empty() {
                    target.metrics_path = matched_target.metrics_path.clone();
                }
                target.job = matched_target.job.clone();
                targets.push(target);
            }
        }
        (targets, errs)
    }
}
