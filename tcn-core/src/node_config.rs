use crate::identity::Identity;
use crate::{Result, TcnError};
use libp2p::multiaddr::{self, Protocol};
use libp2p::{Multiaddr, PeerId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const MDNS_INTERVAL: u64 = 10;
pub const RESOLVE_CACHE_SIZE: u32 = 128;

/// Daemon release whose config schema the record follows.
pub const DAEMON_CONFIG_VERSION: &str = "0.4.0";
const VERSION_CHECK: &str = "error";
// 48 hours in nanoseconds
const VERSION_CHECK_PERIOD: &str = "172800000000000";
const VERSION_AUTO_UPDATE: &str = "minor";

/// One entry of the shared bootstrap list, `/ip4/<host>/tcp/<port>/ipfs/<peer>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPeer {
    pub host: Ipv4Addr,
    pub port: u16,
    pub peer_id: PeerId,
}

impl BootstrapPeer {
    /// Accepts both the `/ipfs/` and `/p2p/` spellings of the peer component.
    pub fn parse(addr: &str) -> Result<Self> {
        let fail = |reason: String| TcnError::BootstrapParseFailed {
            addr: addr.to_string(),
            reason,
        };

        // `/ipfs/` is the legacy name of the `/p2p/` protocol
        let parsed: Multiaddr = addr
            .trim()
            .replacen("/ipfs/", "/p2p/", 1)
            .parse()
            .map_err(|error: multiaddr::Error| fail(error.to_string()))?;

        let mut components = parsed.iter();
        match (
            components.next(),
            components.next(),
            components.next(),
            components.next(),
        ) {
            (
                Some(Protocol::Ip4(host)),
                Some(Protocol::Tcp(port)),
                Some(Protocol::P2p(peer_id)),
                None,
            ) => Ok(Self {
                host,
                port,
                peer_id,
            }),
            _ => Err(fail(
                "expected /ip4/<host>/tcp/<port>/ipfs/<peer_id>".to_string(),
            )),
        }
    }
}

impl fmt::Display for BootstrapPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/ip4/{}/tcp/{}/ipfs/{}", self.host, self.port, self.peer_id)
    }
}

/// Ordered bootstrap list shared identically by every node of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapSet {
    peers: Vec<BootstrapPeer>,
}

impl BootstrapSet {
    /// Parses every address; a single malformed entry rejects the whole set.
    pub fn parse(addrs: &[String]) -> Result<Self> {
        let peers = addrs
            .iter()
            .map(|addr| BootstrapPeer::parse(addr))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { peers })
    }

    pub fn peers(&self) -> &[BootstrapPeer] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.peers.iter().map(ToString::to_string).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePorts {
    pub swarm: u16,
    pub api: u16,
    pub gateway: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPaths {
    pub ipfs: PathBuf,
    pub ipns: PathBuf,
}

/// Deployment flavour of a cluster.
///
/// `Local` listens on loopback and mounts under the cluster root, `Container`
/// listens on every interface and uses the fixed `/ipfs` and `/ipns` mounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPreset {
    #[default]
    Local,
    Container,
}

impl NetworkPreset {
    pub fn listen_host(self) -> Ipv4Addr {
        match self {
            NetworkPreset::Local => Ipv4Addr::LOCALHOST,
            NetworkPreset::Container => Ipv4Addr::UNSPECIFIED,
        }
    }

    pub fn mounts(self, root: &Path, index: usize) -> MountPaths {
        match self {
            NetworkPreset::Local => MountPaths {
                ipfs: root.join(format!("ipfs{}", index)),
                ipns: root.join(format!("ipns{}", index)),
            },
            NetworkPreset::Container => MountPaths {
                ipfs: PathBuf::from("/ipfs"),
                ipns: PathBuf::from("/ipns"),
            },
        }
    }
}

impl fmt::Display for NetworkPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkPreset::Local => write!(f, "local"),
            NetworkPreset::Container => write!(f, "container"),
        }
    }
}

impl FromStr for NetworkPreset {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(NetworkPreset::Local),
            "container" => Ok(NetworkPreset::Container),
            other => Err(format!(
                "unsupported preset '{}': expected local or container",
                other
            )),
        }
    }
}

/// The daemon's configuration record, serialized with the daemon's own key names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeConfig {
    pub identity: Identity,
    pub addresses: Addresses,
    pub mounts: Mounts,
    pub version: VersionInfo,
    pub discovery: Discovery,
    pub ipns: Ipns,
    pub bootstrap: Vec<String>,
    pub gateway: Gateway,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Addresses {
    pub swarm: Vec<String>,
    #[serde(rename = "API")]
    pub api: String,
    pub gateway: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mounts {
    #[serde(rename = "IPFS")]
    pub ipfs: String,
    #[serde(rename = "IPNS")]
    pub ipns: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionInfo {
    pub current: String,
    pub check: String,
    pub check_period: String,
    pub auto_update: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            current: DAEMON_CONFIG_VERSION.to_string(),
            check: VERSION_CHECK.to_string(),
            check_period: VERSION_CHECK_PERIOD.to_string(),
            auto_update: VERSION_AUTO_UPDATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discovery {
    #[serde(rename = "MDNS")]
    pub mdns: Mdns,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mdns {
    pub enabled: bool,
    pub interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipns {
    pub resolve_cache_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Gateway {
    pub root_redirect: String,
    pub writable: bool,
}

impl NodeConfig {
    pub fn build(
        identity: &Identity,
        bootstrap: &BootstrapSet,
        ports: NodePorts,
        mounts: &MountPaths,
        preset: NetworkPreset,
    ) -> Self {
        let host = preset.listen_host();

        Self {
            identity: identity.clone(),
            addresses: Addresses {
                swarm: vec![tcp_multiaddr(host, ports.swarm)],
                api: tcp_multiaddr(host, ports.api),
                gateway: tcp_multiaddr(host, ports.gateway),
            },
            mounts: Mounts {
                ipfs: mounts.ipfs.display().to_string(),
                ipns: mounts.ipns.display().to_string(),
            },
            version: VersionInfo::default(),
            discovery: Discovery {
                mdns: Mdns {
                    enabled: true,
                    interval: MDNS_INTERVAL,
                },
            },
            ipns: Ipns {
                resolve_cache_size: RESOLVE_CACHE_SIZE,
            },
            bootstrap: bootstrap.to_strings(),
            gateway: Gateway {
                root_redirect: String::new(),
                writable: false,
            },
        }
    }

    pub fn swarm_port(&self) -> Option<u16> {
        self.addresses
            .swarm
            .first()
            .and_then(|addr| multiaddr_port(addr))
    }

    pub fn api_port(&self) -> Option<u16> {
        multiaddr_port(&self.addresses.api)
    }

    pub fn gateway_port(&self) -> Option<u16> {
        multiaddr_port(&self.addresses.gateway)
    }

    pub fn bootstrap_set(&self) -> Result<BootstrapSet> {
        BootstrapSet::parse(&self.bootstrap)
    }
}

fn tcp_multiaddr(host: Ipv4Addr, port: u16) -> String {
    format!("/ip4/{}/tcp/{}", host, port)
}

fn multiaddr_port(addr: &str) -> Option<u16> {
    let mut parts = addr.trim_matches('/').split('/');
    while let Some(part) = parts.next() {
        if part == "tcp" {
            return parts.next()?.parse().ok();
        }
    }
    None
}
