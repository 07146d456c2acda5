//! The precedence engine running every matcher over a task batch.

use std::collections::{HashMap, HashSet};

use crate::error::Errors;
use crate::matcher::{MatchResult, Matcher, MatcherType, match_containers};
use crate::task::Task;

/// Runs all configured matchers and keeps the tasks that ended up with at
/// least one matched container.
pub struct TaskFilter {
    matchers: HashMap<MatcherType, Vec<Matcher>>,
}

impl TaskFilter {
    pub fn new(matchers: HashMap<MatcherType, Vec<Matcher>>) -> Self {
        Self { matchers }
    }

    /// Annotate and select the matched subset of a batch.
    ///
    /// Two phases: first every matcher scans the whole batch and produces a
    /// [`MatchResult`], then the results are applied to the tasks in
    /// precedence order (service, task definition, docker label), so earlier
    /// matcher types claim container ports first. Per-container matcher
    /// errors end up in the aggregate without stopping the scan.
    ///
    /// Returned tasks are ordered by batch index and their matched
    /// containers by container index; target order within a container is
    /// precedence order and is left alone. The same batch always produces
    /// the same output.
    pub fn filter(&self, mut tasks: Vec<Task>) -> (Vec<Task>, Errors) {
        let mut errs = Errors::new();
        let mut matched: HashMap<MatcherType, Vec<MatchResult>> = HashMap::new();
        for tpe in MatcherType::ordered() {
            let Some(matchers) = self.matchers.get(&tpe) else {
                continue;
            };
            for (index, matcher) in matchers.iter().enumerate() {
                let (result, matcher_errs) = match_containers(&tasks, matcher, index);
                if let Err(matcher_errs) = matcher_errs.into_result() {
                    errs.push(
                        anyhow::Error::new(matcher_errs)
                            .context(format!("matcher failed with type {tpe} index {index}")),
                    );
                }
                tracing::debug!(
                    matcher_type = %tpe,
                    matcher_index = index,
                    tasks = tasks.len(),
                    matched_tasks = result.tasks.len(),
                    matched_containers = result.containers.len(),
                    "matched"
                );
                matched.entry(tpe).or_default().push(result);
            }
        }

        let mut matched_tasks = HashSet::new();
        for tpe in MatcherType::ordered() {
            for result in matched.remove(&tpe).unwrap_or_default() {
                for container in result.containers {
                    matched_tasks.insert(container.task_index);
                    tasks[container.task_index].add_matched_container(container);
                }
            }
        }

        let mut filtered = Vec::with_capacity(matched_tasks.len());
        for (index, mut task) in tasks.into_iter().enumerate() {
            if !matched_tasks.contains(&index) {
                continue;
            }
            task.matched.sort_by_key(|c| c.container_index);
            filtered.push(task);
        }
        (filtered, errs)
    }
}
