//! tcn core - bootstrap and lifecycle control for local multi-node test networks

pub mod cluster;
pub mod daemon;
pub mod error;
pub mod identity;
pub mod node_config;
pub mod operations;
pub mod repo;

pub use cluster::*;
pub use daemon::{
    DEFAULT_DAEMON_BINARY, DEFAULT_REPO_ENV, DEFAULT_STOP_TIMEOUT, DaemonExit, DaemonProcess,
    DaemonRegistry, DaemonSpec, ExitOutcome, resolve_binary,
};
pub use error::{Result, TcnError};
pub use identity::{DEFAULT_KEY_BITS, Identity, KeyType, MIN_KEY_BITS, generate_identity};
pub use node_config::{
    BootstrapPeer, BootstrapSet, MountPaths, NetworkPreset, NodeConfig, NodePorts,
};
pub use operations::*;
pub use repo::NodeRepo;
