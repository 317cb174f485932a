use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use tcn_core::{
    ClusterInitRequest, ClusterLayout, DEFAULT_API_PORT, DEFAULT_GATEWAY_PORT, DEFAULT_KEY_BITS,
    DEFAULT_NODE_COUNT, DEFAULT_STOP_TIMEOUT, DEFAULT_SWARM_PORT, DaemonSpec, KeyType, MountPaths,
    NetworkPreset, Result, TcnError,
};

/// Launcher settings, layered from an optional file and `TCN_*` environment
/// variables. Command line flags are applied on top by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default = "default_nodes")]
    pub nodes: usize,
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub preset: NetworkPreset,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Shared mount points for every node, replacing the preset's.
    #[serde(default)]
    pub mounts: Option<MountPaths>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_swarm_base")]
    pub swarm_base: u16,
    #[serde(default = "default_api_base")]
    pub api_base: u16,
    #[serde(default = "default_gateway_base")]
    pub gateway_base: u16,
    #[serde(default = "default_advertise_host")]
    pub advertise_host: Ipv4Addr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub key_type: KeyType,
    #[serde(default = "default_key_bits")]
    pub bits: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_binary")]
    pub binary: String,
    #[serde(default = "default_daemon_args")]
    pub args: Vec<String>,
    #[serde(default = "default_repo_env")]
    pub repo_env: String,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_nodes() -> usize {
    DEFAULT_NODE_COUNT
}

fn default_root() -> PathBuf {
    PathBuf::from(".tcn")
}

fn default_swarm_base() -> u16 {
    DEFAULT_SWARM_PORT
}

fn default_api_base() -> u16 {
    DEFAULT_API_PORT
}

fn default_gateway_base() -> u16 {
    DEFAULT_GATEWAY_PORT
}

fn default_advertise_host() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_key_bits() -> usize {
    DEFAULT_KEY_BITS
}

fn default_daemon_binary() -> String {
    DaemonSpec::default().binary
}

fn default_daemon_args() -> Vec<String> {
    DaemonSpec::default().args
}

fn default_repo_env() -> String {
    DaemonSpec::default().repo_env
}

fn default_stop_timeout_secs() -> u64 {
    DEFAULT_STOP_TIMEOUT.as_secs()
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            root: default_root(),
            preset: NetworkPreset::default(),
            network: NetworkConfig::default(),
            identity: IdentityConfig::default(),
            daemon: DaemonConfig::default(),
            mounts: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            swarm_base: default_swarm_base(),
            api_base: default_api_base(),
            gateway_base: default_gateway_base(),
            advertise_host: default_advertise_host(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key_type: KeyType::default(),
            bits: default_key_bits(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            binary: default_daemon_binary(),
            args: default_daemon_args(),
            repo_env: default_repo_env(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

impl LauncherConfig {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("TCN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TcnError::Config(e.to_string()))?;

        let config: LauncherConfig = settings
            .try_deserialize()
            .map_err(|e| TcnError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn layout(&self) -> ClusterLayout {
        ClusterLayout {
            node_count: self.nodes,
            swarm_base: self.network.swarm_base,
            api_base: self.network.api_base,
            gateway_base: self.network.gateway_base,
            advertise_host: self.network.advertise_host,
        }
    }

    pub fn init_request(&self) -> ClusterInitRequest {
        ClusterInitRequest {
            key_type: self.identity.key_type,
            key_bits: self.identity.bits,
            preset: self.preset,
            mounts: self.mounts.clone(),
        }
    }

    pub fn daemon_spec(&self) -> DaemonSpec {
        DaemonSpec {
            binary: self.daemon.binary.clone(),
            args: self.daemon.args.clone(),
            repo_env: self.daemon.repo_env.clone(),
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.stop_timeout_secs)
    }
}
