use super::bootstrap::BootstrapContext;
use super::types::{
    ClusterInitRequest, ClusterInitResult, ClusterLayout, ClusterReadyState, NodeSummary,
};
use crate::identity::generate_identity;
use crate::node_config::NodeConfig;
use crate::repo::NodeRepo;
use crate::{Result, TcnError};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ClusterManager {
    root: PathBuf,
    layout: ClusterLayout,
}

impl ClusterManager {
    pub fn new(root: impl Into<PathBuf>, layout: ClusterLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn layout(&self) -> &ClusterLayout {
        &self.layout
    }

    pub fn repo(&self, index: usize) -> NodeRepo {
        NodeRepo::new(self.layout.repo_path(&self.root, index))
    }

    pub fn repo_paths(&self) -> Vec<PathBuf> {
        (0..self.layout.node_count)
            .map(|index| self.layout.repo_path(&self.root, index))
            .collect()
    }

    /// Creates every node repository when the cluster root is missing,
    /// otherwise checks that all of them already exist.
    ///
    /// Initialization is all-or-nothing per run: an existing root is never
    /// repaired, since its nodes were frozen with the full bootstrap list.
    pub fn init_if_needed(&self, request: &ClusterInitRequest) -> Result<ClusterInitResult> {
        self.layout.validate()?;

        if self.root.exists() {
            self.ensure_consistent()?;
            tracing::info!(
                "reusing existing cluster of {} nodes at {:?}",
                self.layout.node_count,
                self.root
            );
            return Ok(ClusterInitResult {
                state: ClusterReadyState::Reused,
                repos: self.repo_paths(),
            });
        }

        self.initialize(request)?;
        Ok(ClusterInitResult {
            state: ClusterReadyState::Initialized,
            repos: self.repo_paths(),
        })
    }

    fn ensure_consistent(&self) -> Result<()> {
        for index in 0..self.layout.node_count {
            let repo = self.repo(index);
            if !repo.is_initialized() {
                return Err(TcnError::InconsistentCluster {
                    index,
                    path: repo.root().to_path_buf(),
                });
            }
        }
        Ok(())
    }

    fn initialize(&self, request: &ClusterInitRequest) -> Result<()> {
        let mut context = BootstrapContext::new(&self.layout);
        for _ in 0..self.layout.node_count {
            let identity = generate_identity(request.key_type, request.key_bits)?;
            context.push(identity)?;
        }
        let plan = context.freeze()?;

        for (index, identity) in plan.identities.iter().enumerate() {
            let ports = self.layout.ports_for(index)?;
            let mounts = request
                .mounts
                .clone()
                .unwrap_or_else(|| request.preset.mounts(&self.root, index));

            let config =
                NodeConfig::build(identity, &plan.bootstrap, ports, &mounts, request.preset);

            let repo = self.repo(index);
            repo.init(&config)?;
            tracing::info!("initialized node {} at {:?}", index, repo.root());
        }

        Ok(())
    }

    /// Reads back every node's persisted configuration in index order.
    pub fn load_configs(&self) -> Result<Vec<NodeConfig>> {
        self.ensure_consistent()?;
        (0..self.layout.node_count)
            .map(|index| self.repo(index).load_config())
            .collect()
    }

    pub fn describe(&self) -> Result<Vec<NodeSummary>> {
        let configs = self.load_configs()?;
        Ok(configs
            .into_iter()
            .enumerate()
            .map(|(index, config)| NodeSummary {
                index,
                repo: self.layout.repo_path(&self.root, index),
                swarm_port: config.swarm_port(),
                api_port: config.api_port(),
                gateway_port: config.gateway_port(),
                peer_id: config.identity.peer_id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{DEFAULT_KEY_BITS, KeyType};
    use crate::node_config::{MountPaths, NetworkPreset};
    use std::collections::HashSet;
    use std::fs;

    fn fast_request() -> ClusterInitRequest {
        ClusterInitRequest {
            key_type: KeyType::Ed25519,
            key_bits: DEFAULT_KEY_BITS,
            ..ClusterInitRequest::default()
        }
    }

    fn snapshot(manager: &ClusterManager) -> Vec<Vec<u8>> {
        (0..manager.layout().node_count)
            .map(|index| fs::read(manager.repo(index).config_path()).unwrap())
            .collect()
    }

    #[test]
    fn fresh_bootstrap_creates_consistent_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("testcluster");
        let manager = ClusterManager::new(&root, ClusterLayout::new(3));

        let result = manager.init_if_needed(&fast_request()).unwrap();
        assert_eq!(result.state, ClusterReadyState::Initialized);
        assert_eq!(
            result.repos,
            vec![root.join("0"), root.join("1"), root.join("2")]
        );

        let configs = manager.load_configs().unwrap();
        assert_eq!(configs.len(), 3);

        let peer_ids: HashSet<_> = configs
            .iter()
            .map(|config| config.identity.peer_id.clone())
            .collect();
        assert_eq!(peer_ids.len(), 3);

        for (index, config) in configs.iter().enumerate() {
            assert_eq!(config.swarm_port(), Some(4000 + index as u16));
            assert_eq!(config.api_port(), Some(5000 + index as u16));
            assert_eq!(config.gateway_port(), Some(8080 + index as u16));
            assert_eq!(config.bootstrap, configs[0].bootstrap);
            assert_eq!(
                config.mounts.ipfs,
                root.join(format!("ipfs{}", index)).display().to_string()
            );

            let bootstrap = config.bootstrap_set().unwrap();
            assert_eq!(bootstrap.len(), 3);
            let entry = &bootstrap.peers()[index];
            assert_eq!(entry.port, 4000 + index as u16);
            assert_eq!(entry.peer_id.to_string(), config.identity.peer_id);
        }
    }

    #[test]
    fn rerun_reuses_cluster_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ClusterManager::new(dir.path().join("c"), ClusterLayout::new(2));

        manager.init_if_needed(&fast_request()).unwrap();
        let before = snapshot(&manager);

        let result = manager.init_if_needed(&fast_request()).unwrap();
        assert_eq!(result.state, ClusterReadyState::Reused);
        assert_eq!(snapshot(&manager), before);
    }

    #[test]
    fn missing_repository_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("c");
        let manager = ClusterManager::new(&root, ClusterLayout::new(3));

        manager.init_if_needed(&fast_request()).unwrap();
        fs::remove_dir_all(root.join("1")).unwrap();

        let error = manager.init_if_needed(&fast_request()).unwrap_err();
        match error {
            TcnError::InconsistentCluster { index, path } => {
                assert_eq!(index, 1);
                assert_eq!(path, root.join("1"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!root.join("1").exists());
    }

    #[test]
    fn larger_node_count_than_initialized_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("c");

        ClusterManager::new(&root, ClusterLayout::new(2))
            .init_if_needed(&fast_request())
            .unwrap();

        let grown = ClusterManager::new(&root, ClusterLayout::new(3));
        let error = grown.init_if_needed(&fast_request()).unwrap_err();
        assert!(matches!(error, TcnError::InconsistentCluster { index: 2, .. }));
        assert!(!root.join("2").exists());
    }

    #[test]
    fn existing_empty_root_is_inconsistent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ClusterManager::new(dir.path(), ClusterLayout::new(1));

        let error = manager.init_if_needed(&fast_request()).unwrap_err();
        assert!(matches!(error, TcnError::InconsistentCluster { index: 0, .. }));
    }

    #[test]
    fn unsafe_key_size_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("c");
        let manager = ClusterManager::new(&root, ClusterLayout::new(2));

        let request = ClusterInitRequest {
            key_bits: 512,
            ..fast_request()
        };
        let error = manager.init_if_needed(&request).unwrap_err();
        assert!(matches!(error, TcnError::UnsafeKeySize { bits: 512, .. }));
        assert!(!root.exists());
    }

    #[test]
    fn invalid_layout_is_rejected_before_keygen() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("c");
        let manager = ClusterManager::new(&root, ClusterLayout::new(0));

        assert!(matches!(
            manager.init_if_needed(&fast_request()),
            Err(TcnError::Config(_))
        ));
        assert!(!root.exists());
    }

    #[test]
    fn mount_override_and_container_preset() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ClusterManager::new(dir.path().join("c"), ClusterLayout::new(2));

        let request = ClusterInitRequest {
            preset: NetworkPreset::Container,
            mounts: Some(MountPaths {
                ipfs: "/mnt/ipfs".into(),
                ipns: "/mnt/ipns".into(),
            }),
            ..fast_request()
        };
        manager.init_if_needed(&request).unwrap();

        for config in manager.load_configs().unwrap() {
            assert!(config.addresses.api.starts_with("/ip4/0.0.0.0/"));
            assert_eq!(config.mounts.ipfs, "/mnt/ipfs");
            assert_eq!(config.mounts.ipns, "/mnt/ipns");
            assert!(config.bootstrap.iter().all(|addr| addr.starts_with("/ip4/127.0.0.1/")));
        }
    }

    #[test]
    fn describe_reports_persisted_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ClusterManager::new(dir.path().join("c"), ClusterLayout::new(2));
        manager.init_if_needed(&fast_request()).unwrap();

        let summaries = manager.describe().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[1].index, 1);
        assert_eq!(summaries[1].swarm_port, Some(4001));
        assert_eq!(summaries[1].gateway_port, Some(8081));
        assert!(!summaries[1].peer_id.is_empty());
    }
}
