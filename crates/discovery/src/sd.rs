//! The discovery loop: fetch, filter, export, publish.

use std::future::Future;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::error::Errors;
use crate::exporter::TaskExporter;
use crate::fetcher::Fetcher;
use crate::filter::TaskFilter;
use crate::target::{self, PrometheusTarget};
use crate::writer;

/// Periodic service discovery against one cluster.
///
/// Owns the per-tick pipeline. Transient errors are logged and the loop
/// keeps running; it stops only when the shutdown future resolves.
pub struct ServiceDiscovery<F> {
    config: Config,
    fetcher: F,
    filter: TaskFilter,
    exporter: TaskExporter,
}

impl<F: Fetcher> ServiceDiscovery<F> {
    /// Validate the configuration and assemble the pipeline. `config` may be
    /// raw; it is initialised here and configuration errors are fatal.
    pub fn new(mut config: Config, fetcher: F) -> Result<Self> {
        config.init().context("invalid discovery config")?;
        let filter = TaskFilter::new(config.matchers()?);
        let exporter = TaskExporter::new(config.cluster_name.clone());
        Ok(Self {
            config,
            fetcher,
            filter,
            exporter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one pass immediately, then one per refresh interval, each ending
    /// in an atomic write of the result file.
    ///
    /// Passes never overlap: a pass that runs long delays the next tick
    /// instead of parallelising it. Returns cleanly at the next tick
    /// boundary once `shutdown` resolves; the last written file stays on
    /// disk.
    pub async fn run_and_write_file(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(self.config.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(
                        result_file = %self.config.result_file.display(),
                        "discovery stopped"
                    );
                    return Ok(());
                }
                _ = interval.tick() => self.discover_and_write().await,
            }
        }
    }

    /// Fetch, filter and export one batch without touching the result file.
    ///
    /// `Err` means the fetch itself failed and there is nothing to publish;
    /// pipeline-stage failures come back in the aggregate next to the valid
    /// targets.
    pub async fn discover(&self) -> Result<(Vec<PrometheusTarget>, Errors)> {
        let tasks = self.fetcher.fetch_and_decorate().await?;
        let fetched = tasks.len();
        let (tasks, mut errs) = self.filter.filter(tasks);
        let (targets, export_errs) = self.exporter.export_tasks(&tasks);
        errs.extend(export_errs);
        tracing::debug!(
            fetched,
            matched_tasks = tasks.len(),
            targets = targets.len(),
            "discovery pass finished"
        );
        Ok((targets, errs))
    }

    /// One full pass. On fetch failure publication is skipped and the
    /// previous file is left in place.
    async fn discover_and_write(&self) {
        let targets = match self.discover().await {
            Ok((targets, errs)) => {
                if let Err(errs) = errs.into_result() {
                    tracing::warn!(errors = errs.len(), "partial discovery failures: {errs}");
                }
                targets
            }
            Err(err) => {
                tracing::error!("fetching tasks failed, skipping publication: {err:#}");
                return;
            }
        };
        let result_file = &self.config.result_file;
        match target::targets_to_file_sd_yaml(&targets, &self.config.job_label_name)
            .and_then(|doc| writer::write_file_atomic(result_file, &doc))
        {
            Ok(()) => tracing::debug!(
                targets = targets.len(),
                result_file = %result_file.display(),
                "targets written"
            ),
            Err(err) => {
                tracing::error!("writing {} failed: {err:#}", result_file.display());
            }
        }
    }
}
