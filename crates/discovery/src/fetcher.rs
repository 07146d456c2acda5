//! The boundary to the orchestrator: fetchers deliver decorated tasks.

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::task::Task;

/// Produces one batch of decorated tasks per discovery tick.
///
/// Implementations talk to the orchestrator API and attach to every task its
/// definition, its runtime containers (bridge-mode port bindings), its
/// service when the name passes the configured service patterns (see
/// [`crate::service_configs_to_filter`]) and the EC2 host descriptor when
/// the task runs on an instance. Caching described task definitions and
/// instances is the implementation's concern; a strict LRU sized to the ECS
/// service quotas (~2000 entries each) fits a full cluster, and the describe
/// APIs page at 10 service ids and 100 instance ids per call.
pub trait Fetcher: Send + Sync {
    fn fetch_and_decorate(&self) -> impl Future<Output = Result<Vec<Task>>> + Send;
}

/// Fetcher serving batches from an in-memory factory.
///
/// The filter annotates tasks in place, so the factory rebuilds the batch on
/// every call instead of handing out a shared one.
pub struct StaticFetcher<F> {
    factory: F,
}

impl<F> StaticFetcher<F>
where
    F: Fn() -> Vec<Task> + Send + Sync,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F> Fetcher for StaticFetcher<F>
where
    F: Fn() -> Vec<Task> + Send + Sync,
{
    async fn fetch_and_decorate(&self) -> Result<Vec<Task>> {
        Ok((self.factory)())
    }
}

/// Fetcher that re-reads a JSON snapshot of decorated tasks on every tick.
///
/// Runs the pipeline without orchestrator credentials: an external process
/// keeps the snapshot current and changes are picked up at the next tick.
pub struct SnapshotFetcher {
    path: PathBuf,
}

impl SnapshotFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Fetcher for SnapshotFetcher {
    async fn fetch_and_decorate(&self) -> Result<Vec<Task>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .context(format!(
                "failed to read task snapshot {}",
                self.path.display()
            ))?;
        serde_json::from_str(&raw).context(format!(
            "invalid task snapshot {}",
            self.path.display()
        ))
    }
}
