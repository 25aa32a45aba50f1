//! Cluster discovery, fan-out and per-cluster queries.

mod executor;
mod health;
mod registry;
mod selector;

pub use executor::{ClusterResult, Executor, Target};
pub use health::{check_health, classify, HealthInfo, HealthStatus};
pub use registry::{ClusterFilter, ClusterInfo, ClusterRegistry, RegistryError};
pub use selector::{
	capabilities_for_cluster, summarize_nodes, ClusterCapabilities, Selector, WorkloadRequirements,
};
