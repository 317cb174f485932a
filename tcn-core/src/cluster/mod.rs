pub mod bootstrap;
pub mod state;
pub mod types;

pub use bootstrap::{BootstrapContext, ClusterPlan};
pub use state::ClusterManager;
pub use types::{
    ClusterInitRequest, ClusterInitResult, ClusterLayout, ClusterReadyState, DEFAULT_API_PORT,
    DEFAULT_GATEWAY_PORT, DEFAULT_NODE_COUNT, DEFAULT_SWARM_PORT, NodeSummary,
};
