use crate::identity::{DEFAULT_KEY_BITS, KeyType};
use crate::node_config::{MountPaths, NetworkPreset, NodePorts};
use crate::{Result, TcnError};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

pub const DEFAULT_NODE_COUNT: usize = 5;
pub const DEFAULT_SWARM_PORT: u16 = 4000;
pub const DEFAULT_API_PORT: u16 = 5000;
pub const DEFAULT_GATEWAY_PORT: u16 = 8080;

/// Port and address plan of a cluster: node `i` listens on `base + i` for
/// each of the three base ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLayout {
    pub node_count: usize,
    pub swarm_base: u16,
    pub api_base: u16,
    pub gateway_base: u16,
    pub advertise_host: Ipv4Addr,
}

impl Default for ClusterLayout {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_COUNT)
    }
}

impl ClusterLayout {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            swarm_base: DEFAULT_SWARM_PORT,
            api_base: DEFAULT_API_PORT,
            gateway_base: DEFAULT_GATEWAY_PORT,
            advertise_host: Ipv4Addr::LOCALHOST,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(TcnError::Config(
                "cluster must have at least one node".to_string(),
            ));
        }

        let ranges = [
            ("swarm", self.swarm_base),
            ("api", self.api_base),
            ("gateway", self.gateway_base),
        ];

        for (name, base) in ranges {
            port_at(base, self.node_count - 1).ok_or_else(|| {
                TcnError::Config(format!(
                    "{} ports starting at {} overflow for {} nodes",
                    name, base, self.node_count
                ))
            })?;
        }

        for (left_index, (left_name, left_base)) in ranges.iter().enumerate() {
            for (right_name, right_base) in ranges.iter().skip(left_index + 1) {
                if ranges_overlap(*left_base, *right_base, self.node_count) {
                    return Err(TcnError::Config(format!(
                        "{} ports ({}..) overlap {} ports ({}..) for {} nodes",
                        left_name, left_base, right_name, right_base, self.node_count
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn ports_for(&self, index: usize) -> Result<NodePorts> {
        if index >= self.node_count {
            return Err(TcnError::Internal(format!(
                "node index {} outside cluster of {} nodes",
                index, self.node_count
            )));
        }

        let overflow = || TcnError::Config(format!("port overflow for node {}", index));
        Ok(NodePorts {
            swarm: port_at(self.swarm_base, index).ok_or_else(overflow)?,
            api: port_at(self.api_base, index).ok_or_else(overflow)?,
            gateway: port_at(self.gateway_base, index).ok_or_else(overflow)?,
        })
    }

    pub fn bootstrap_address(&self, index: usize, peer_id: &str) -> Result<String> {
        let ports = self.ports_for(index)?;
        Ok(format!(
            "/ip4/{}/tcp/{}/ipfs/{}",
            self.advertise_host, ports.swarm, peer_id
        ))
    }

    pub fn repo_path(&self, root: &Path, index: usize) -> PathBuf {
        root.join(index.to_string())
    }
}

fn port_at(base: u16, index: usize) -> Option<u16> {
    let offset = u16::try_from(index).ok()?;
    base.checked_add(offset)
}

fn ranges_overlap(left: u16, right: u16, count: usize) -> bool {
    let (low, high) = if left <= right {
        (left, right)
    } else {
        (right, left)
    };
    ((high - low) as usize) < count
}

#[derive(Debug, Clone)]
pub struct ClusterInitRequest {
    pub key_type: KeyType,
    pub key_bits: usize,
    pub preset: NetworkPreset,
    /// Replaces the preset's mount paths for every node.
    pub mounts: Option<MountPaths>,
}

impl Default for ClusterInitRequest {
    fn default() -> Self {
        Self {
            key_type: KeyType::default(),
            key_bits: DEFAULT_KEY_BITS,
            preset: NetworkPreset::default(),
            mounts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterReadyState {
    /// Every repository was created by this run.
    Initialized,
    /// All repositories already existed and were left untouched.
    Reused,
}

#[derive(Debug, Clone)]
pub struct ClusterInitResult {
    pub state: ClusterReadyState,
    pub repos: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub index: usize,
    pub repo: PathBuf,
    pub peer_id: String,
    pub swarm_port: Option<u16>,
    pub api_port: Option<u16>,
    pub gateway_port: Option<u16>,
}
