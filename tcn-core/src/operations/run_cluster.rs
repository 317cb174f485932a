use crate::{DaemonExit, DaemonRegistry, DaemonSpec, Result};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

pub struct RunClusterOperationResult {
    /// One entry per daemon, in node-index order.
    pub exits: Vec<DaemonExit>,
}

/// Starts one daemon per repository, waits for `shutdown` and then stops
/// every daemon.
#[derive(Clone)]
pub struct RunClusterOperation {
    spec: DaemonSpec,
    stop_timeout: Duration,
}

impl RunClusterOperation {
    pub fn new(spec: DaemonSpec, stop_timeout: Duration) -> Self {
        Self { spec, stop_timeout }
    }

    pub async fn run<F>(&self, repos: &[PathBuf], shutdown: F) -> Result<RunClusterOperationResult>
    where
        F: Future<Output = ()>,
    {
        let mut registry = DaemonRegistry::start_all(&self.spec, repos, self.stop_timeout).await?;
        tracing::info!("{} daemons running", registry.len());

        shutdown.await;

        tracing::info!("cleaning up");
        let exits = registry.stop_all(self.stop_timeout).await;
        Ok(RunClusterOperationResult { exits })
    }
}
