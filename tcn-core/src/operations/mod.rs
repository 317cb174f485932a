pub mod init_cluster;
pub mod run_cluster;

pub use init_cluster::InitClusterOperation;
pub use run_cluster::{RunClusterOperation, RunClusterOperationResult};
