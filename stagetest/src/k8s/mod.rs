//! Kubernetes access and baseline cluster verification.

mod client;
mod options;
mod verify;

#[cfg(feature = "kube-client")]
pub use client::{KubeClusterClient, KubeConnector};
pub use client::{ClusterClient, ClusterConnector, NamespaceInfo, NodeInfo, PodInfo};
pub use options::KubectlOptions;
pub use verify::{verify_nodes_ready, verify_workloads, WorkloadExpectation};
