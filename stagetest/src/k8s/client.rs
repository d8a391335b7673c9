//! Cluster API seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::ClusterError;
use crate::k8s::KubectlOptions;

/// A namespace as seen by the harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    /// Namespace name.
    pub name: String,
    /// Phase, e.g. `Active`.
    pub phase: Option<String>,
}

/// A pod as seen by the harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    /// Pod name.
    pub name: String,
    /// Namespace the pod lives in.
    pub namespace: String,
    /// Phase, e.g. `Running`.
    pub phase: Option<String>,
}

/// A node as seen by the harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node name.
    pub name: String,
    /// Whether the `Ready` condition is `True`.
    pub ready: bool,
}

/// Read-only queries against a cluster.
///
/// A client is bound to the namespace of the [`KubectlOptions`] it was
/// connected with; namespaced queries go there.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// The namespace this client is scoped to.
    fn namespace(&self) -> &str;

    /// Fetches a namespace; [`ClusterError::NotFound`] if it does not exist.
    async fn get_namespace(&self, name: &str) -> Result<NamespaceInfo, ClusterError>;

    /// Lists the pods of the client's namespace.
    async fn list_pods(&self) -> Result<Vec<PodInfo>, ClusterError>;

    /// Lists every node.
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ClusterError>;
}

/// Opens a [`ClusterClient`] for connection options.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connects using the kubeconfig and context in `options`.
    async fn connect(&self, options: &KubectlOptions) -> Result<Arc<dyn ClusterClient>, ClusterError>;
}

#[cfg(feature = "kube-client")]
mod kube_impl {
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{Namespace, Node, Pod};
    use kube::api::{Api, ListParams};
    use kube::config::{KubeConfigOptions, Kubeconfig};
    use kube::Client;
    use std::sync::Arc;
    use tracing::{debug, instrument};

    use super::{ClusterClient, ClusterConnector, NamespaceInfo, NodeInfo, PodInfo};
    use crate::errors::ClusterError;
    use crate::k8s::KubectlOptions;

    fn api_error(kind: &str, name: &str, err: kube::Error) -> ClusterError {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => ClusterError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            other => ClusterError::Api(other.to_string()),
        }
    }

    /// [`ClusterClient`] backed by the Kubernetes API.
    #[derive(Clone)]
    pub struct KubeClusterClient {
        client: Client,
        namespace: String,
    }

    impl KubeClusterClient {
        /// Builds a client from the options' kubeconfig file and context.
        #[instrument(skip_all, fields(kubeconfig = %options.config_path.display()))]
        pub async fn connect(options: &KubectlOptions) -> Result<Self, ClusterError> {
            let kubeconfig = Kubeconfig::read_from(&options.config_path)
                .map_err(|e| ClusterError::Client(format!("Failed to read kubeconfig: {e}")))?;
            let config_options = KubeConfigOptions {
                context: options.context.clone(),
                ..KubeConfigOptions::default()
            };
            let config = kube::Config::from_custom_kubeconfig(kubeconfig, &config_options)
                .await
                .map_err(|e| ClusterError::Client(format!("Failed to create kube config: {e}")))?;
            let client = Client::try_from(config).map_err(|e| ClusterError::Client(e.to_string()))?;
            debug!(namespace = %options.namespace, "Connected to cluster");
            Ok(Self {
                client,
                namespace: options.namespace.clone(),
            })
        }
    }

    impl std::fmt::Debug for KubeClusterClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("KubeClusterClient")
                .field("namespace", &self.namespace)
                .finish_non_exhaustive()
        }
    }

    #[async_trait]
    impl ClusterClient for KubeClusterClient {
        fn namespace(&self) -> &str {
            &self.namespace
        }

        #[instrument(skip(self))]
        async fn get_namespace(&self, name: &str) -> Result<NamespaceInfo, ClusterError> {
            let api: Api<Namespace> = Api::all(self.client.clone());
            let ns = api
                .get(name)
                .await
                .map_err(|e| api_error("Namespace", name, e))?;
            Ok(NamespaceInfo {
                name: ns.metadata.name.unwrap_or_else(|| name.to_string()),
                phase: ns.status.and_then(|s| s.phase),
            })
        }

        #[instrument(skip(self), fields(namespace = %self.namespace))]
        async fn list_pods(&self) -> Result<Vec<PodInfo>, ClusterError> {
            let namespace = self.namespace.as_str();
            let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
            let pods = api
                .list(&ListParams::default())
                .await
                .map_err(|e| api_error("Namespace", namespace, e))?;
            Ok(pods
                .items
                .into_iter()
                .map(|pod| PodInfo {
                    name: pod.metadata.name.unwrap_or_default(),
                    namespace: namespace.to_string(),
                    phase: pod.status.and_then(|s| s.phase),
                })
                .collect())
        }

        #[instrument(skip(self))]
        async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ClusterError> {
            let api: Api<Node> = Api::all(self.client.clone());
            let nodes = api
                .list(&ListParams::default())
                .await
                .map_err(|e| ClusterError::Api(e.to_string()))?;
            Ok(nodes
                .items
                .into_iter()
                .map(|node| {
                    let ready = node
                        .status
                        .and_then(|s| s.conditions)
                        .unwrap_or_default()
                        .iter()
                        .any(|c| c.type_ == "Ready" && c.status == "True");
                    NodeInfo {
                        name: node.metadata.name.unwrap_or_default(),
                        ready,
                    }
                })
                .collect())
        }
    }

    /// [`ClusterConnector`] producing [`KubeClusterClient`]s.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct KubeConnector;

    #[async_trait]
    impl ClusterConnector for KubeConnector {
        async fn connect(
            &self,
            options: &KubectlOptions,
        ) -> Result<Arc<dyn ClusterClient>, ClusterError> {
            Ok(Arc::new(KubeClusterClient::connect(options).await?))
        }
    }
}

#[cfg(feature = "kube-client")]
pub use kube_impl::{KubeClusterClient, KubeConnector};
