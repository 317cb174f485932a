use crate::{ClusterInitRequest, ClusterInitResult, ClusterManager, Result, TcnError};

#[derive(Clone)]
pub struct InitClusterOperation {
    cluster_manager: ClusterManager,
}

impl InitClusterOperation {
    pub fn new(cluster_manager: ClusterManager) -> Self {
        Self { cluster_manager }
    }

    /// Key generation is CPU bound, so initialization runs on the blocking pool.
    pub async fn run(&self, request: ClusterInitRequest) -> Result<ClusterInitResult> {
        let cluster_manager = self.cluster_manager.clone();
        tokio::task::spawn_blocking(move || cluster_manager.init_if_needed(&request))
            .await
            .map_err(|error| TcnError::Internal(format!("init task failed: {}", error)))?
    }
}
