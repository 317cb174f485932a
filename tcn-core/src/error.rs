use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TcnError>;

#[derive(Error, Debug)]
pub enum TcnError {
    #[error("Unsafe key size: {bits} bits requested, at least {min} required")]
    UnsafeKeySize { bits: usize, min: usize },

    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Key serialization failed: {0}")]
    KeySerializationFailed(String),

    #[error("Identity derivation failed: {0}")]
    IdentityDerivationFailed(String),

    #[error("Invalid bootstrap address '{addr}': {reason}")]
    BootstrapParseFailed { addr: String, reason: String },

    #[error("Repository already initialized at {}", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("Inconsistent cluster: node {index} has no repository at {}", path.display())]
    InconsistentCluster { index: usize, path: PathBuf },

    #[error("Failed to spawn daemon for node {index} ({binary}): {reason}")]
    DaemonSpawnFailed {
        index: usize,
        binary: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
