//! Baseline health checks run against a live cluster.
//!
//! Every expectation is recorded as its own check so a report tells an absent
//! namespace apart from an empty one, and both apart from an API failure.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::checks::Checks;
use crate::errors::ClusterError;
use crate::k8s::{ClusterClient, ClusterConnector, KubectlOptions};

const RUNNING_PHASE: &str = "Running";

/// A namespace that must exist, optionally with at least one pod in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadExpectation {
    /// Namespace name.
    pub namespace: String,
    /// Require at least one pod.
    pub require_pods: bool,
}

impl WorkloadExpectation {
    /// The namespace must exist.
    #[must_use]
    pub fn exists(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            require_pods: false,
        }
    }

    /// The namespace must exist and contain pods.
    #[must_use]
    pub fn with_pods(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            require_pods: true,
        }
    }

    /// Istio operator and control plane.
    #[must_use]
    pub fn istio() -> Vec<Self> {
        vec![Self::exists("istio-operator"), Self::with_pods("istio-system")]
    }

    /// cert-manager controller.
    #[must_use]
    pub fn cert_manager() -> Vec<Self> {
        vec![Self::with_pods("cert-manager")]
    }
}

/// Checks that at least `min_nodes` nodes exist and all of them are ready.
///
/// A single observation; nothing is retried.
#[instrument(skip(client, checks))]
pub async fn verify_nodes_ready(client: &dyn ClusterClient, min_nodes: usize, checks: &mut Checks) {
    let Some(nodes) = checks.ok(client.list_nodes().await, "Could not list nodes") else {
        return;
    };

    checks.check(
        nodes.len() >= min_nodes,
        format!("expected at least {min_nodes} nodes, found {}", nodes.len()),
    );
    for node in nodes.iter().filter(|n| !n.ready) {
        checks.fail(format!("node {} is not Ready", node.name));
    }
    info!(nodes = nodes.len(), "Checked node readiness");
}

/// Checks every workload expectation independently.
///
/// Each expectation is checked through a client connected with `options`
/// retargeted at the expectation's namespace.
#[instrument(skip_all, fields(count = expectations.len()))]
pub async fn verify_workloads(
    connector: &dyn ClusterConnector,
    options: &KubectlOptions,
    expectations: &[WorkloadExpectation],
    checks: &mut Checks,
) {
    for expectation in expectations {
        let ns = expectation.namespace.as_str();
        let scoped = options.with_namespace(ns);
        let connecting = format!("Could not connect to the cluster for {ns} namespace");
        let Some(client) = checks.ok(connector.connect(&scoped).await, &connecting) else {
            continue;
        };

        let missing = match client.get_namespace(ns).await {
            Ok(found) => {
                info!(namespace = %found.name, phase = ?found.phase, "Found namespace");
                None
            }
            Err(ClusterError::NotFound { .. }) => Some(format!("Could not find {ns} namespace")),
            Err(e) => Some(format!("Could not get {ns} namespace: {e}")),
        };
        checks.check(missing.is_none(), missing.unwrap_or_default());

        if expectation.require_pods {
            check_running_pods(client.as_ref(), checks).await;
        }
    }
}

/// A namespace counts as running workloads only if at least one of its pods
/// is in the `Running` phase; pending or crashed pods do not.
async fn check_running_pods(client: &dyn ClusterClient, checks: &mut Checks) {
    let ns = client.namespace();
    let message = format!("Could not list pods in {ns} namespace");
    let Some(pods) = checks.ok(client.list_pods().await, &message) else {
        return;
    };

    let running = pods
        .iter()
        .filter(|p| p.phase.as_deref() == Some(RUNNING_PHASE))
        .count();
    info!(namespace = ns, pods = pods.len(), running, "Listed pods");
    if pods.is_empty() {
        checks.fail(format!("no Pods present in {ns} namespace"));
    } else {
        checks.check(
            running > 0,
            format!("no Running Pods in {ns} namespace ({} present)", pods.len()),
        );
    }
}
