//! Test doubles for external tools and the cluster API.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::errors::{ClusterError, ToolError};
use crate::k8s::{ClusterClient, ClusterConnector, KubectlOptions, NamespaceInfo, NodeInfo, PodInfo};
use crate::tools::{CommandOutput, CommandRunner, ShellCommand};

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    Exit { code: i32, stderr: String },
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    reply: Reply,
}

/// A command runner that replays scripted replies and records every call.
///
/// Replies are matched by substring against the rendered command line; the
/// most recently added matching rule wins. Unmatched commands succeed with
/// empty output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<ShellCommand>>,
}

impl ScriptedRunner {
    /// Creates a runner where every command succeeds silently.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies to the GKE scenario's terraform and gcloud calls the way a
    /// healthy run would.
    #[must_use]
    pub fn gke_defaults(cluster_name: &str) -> Self {
        Self::new()
            .on(
                "terraform apply",
                "Apply complete! Resources: 12 added, 0 changed, 0 destroyed.",
            )
            .on(
                "terraform plan",
                "module.gcloud.null_resource.setup_gcloud_cli\n\
                 module.kubectl.null_resource.download_kubectl\n\
                 module.kubectl.null_resource.configure_kubectl\n\
                 Plan: 4 to add, 0 to change, 4 to destroy.",
            )
            .on("terraform destroy", "Destroy complete! Resources: 12 destroyed.")
            .on("terraform output", format!("\"{cluster_name}\""))
    }

    /// Replies to matching commands with `stdout`.
    #[must_use]
    pub fn on(self, pattern: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.push(pattern, Reply::Output(CommandOutput::success(stdout)));
        self
    }

    /// Makes matching commands exit with `code` and `stderr`.
    #[must_use]
    pub fn fail_on(self, pattern: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        self.push(
            pattern,
            Reply::Exit {
                code,
                stderr: stderr.into(),
            },
        );
        self
    }

    fn push(&self, pattern: impl Into<String>, reply: Reply) {
        self.rules.lock().push(Rule {
            pattern: pattern.into(),
            reply,
        });
    }

    /// Returns every command run so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ShellCommand> {
        self.calls.lock().clone()
    }

    /// Returns every command run so far, rendered.
    #[must_use]
    pub fn rendered_calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(ShellCommand::render).collect()
    }

    /// Counts the calls whose rendered form contains `pattern`.
    #[must_use]
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.rendered_calls()
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ToolError> {
        let rendered = command.render();
        self.calls.lock().push(command.clone());

        let reply = self
            .rules
            .lock()
            .iter()
            .rev()
            .find(|r| rendered.contains(&r.pattern))
            .map(|r| r.reply.clone());

        match reply {
            None => Ok(CommandOutput::success("")),
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Exit { code, stderr }) => Err(ToolError::NonZeroExit {
                command: rendered,
                code: Some(code),
                stdout: String::new(),
                stderr,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct FakeCluster {
    namespaces: BTreeMap<String, Vec<PodInfo>>,
    nodes: Vec<NodeInfo>,
    failing_pods: BTreeSet<String>,
    refuse_connections: bool,
    pod_queries: Vec<String>,
    connections: Vec<KubectlOptions>,
}

/// An in-memory cluster.
///
/// Clones share state, so a test can keep one handle for inspection while the
/// scenario connects through another. Connecting returns a handle scoped to
/// the options' namespace.
#[derive(Debug, Clone)]
pub struct FakeClusterClient {
    state: Arc<Mutex<FakeCluster>>,
    namespace: String,
}

impl Default for FakeClusterClient {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            namespace: "default".to_string(),
        }
    }
}

impl FakeClusterClient {
    /// An empty cluster with no namespaces or nodes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A cluster with three ready nodes and running Istio and cert-manager.
    #[must_use]
    pub fn gke_healthy() -> Self {
        Self::new()
            .with_nodes(3, true)
            .with_namespace("istio-operator")
            .with_pods("istio-operator", 1)
            .with_pods("istio-system", 2)
            .with_pods("cert-manager", 3)
    }

    /// Adds an empty namespace.
    #[must_use]
    pub fn with_namespace(self, name: &str) -> Self {
        self.state
            .lock()
            .namespaces
            .entry(name.to_string())
            .or_default();
        self
    }

    /// Adds `count` running pods to a namespace, creating it if needed.
    #[must_use]
    pub fn with_pods(self, namespace: &str, count: usize) -> Self {
        self.with_pods_in_phase(namespace, count, "Running")
    }

    /// Adds `count` pods in `phase` to a namespace, creating it if needed.
    #[must_use]
    pub fn with_pods_in_phase(self, namespace: &str, count: usize, phase: &str) -> Self {
        {
            let mut state = self.state.lock();
            let pods = state.namespaces.entry(namespace.to_string()).or_default();
            let start = pods.len();
            pods.extend((start..start + count).map(|i| PodInfo {
                name: format!("{namespace}-{i}"),
                namespace: namespace.to_string(),
                phase: Some(phase.to_string()),
            }));
        }
        self
    }

    /// Adds `count` nodes.
    #[must_use]
    pub fn with_nodes(self, count: usize, ready: bool) -> Self {
        {
            let mut state = self.state.lock();
            let start = state.nodes.len();
            state.nodes.extend((start..start + count).map(|i| NodeInfo {
                name: format!("gke-node-{i}"),
                ready,
            }));
        }
        self
    }

    /// Makes listing pods in `namespace` fail with an API error.
    #[must_use]
    pub fn failing_pods(self, namespace: &str) -> Self {
        self.state.lock().failing_pods.insert(namespace.to_string());
        self
    }

    /// Makes every connection attempt fail.
    #[must_use]
    pub fn refusing_connections(self) -> Self {
        self.state.lock().refuse_connections = true;
        self
    }

    /// Namespaces whose pods were listed, in order.
    #[must_use]
    pub fn pod_queries(&self) -> Vec<String> {
        self.state.lock().pod_queries.clone()
    }

    /// Options of every successful connection, in order.
    #[must_use]
    pub fn connections(&self) -> Vec<KubectlOptions> {
        self.state.lock().connections.clone()
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get_namespace(&self, name: &str) -> Result<NamespaceInfo, ClusterError> {
        if self.state.lock().namespaces.contains_key(name) {
            Ok(NamespaceInfo {
                name: name.to_string(),
                phase: Some("Active".to_string()),
            })
        } else {
            Err(ClusterError::NotFound {
                kind: "Namespace".to_string(),
                name: name.to_string(),
            })
        }
    }

    async fn list_pods(&self) -> Result<Vec<PodInfo>, ClusterError> {
        let namespace = self.namespace.as_str();
        let mut state = self.state.lock();
        state.pod_queries.push(namespace.to_string());
        if state.failing_pods.contains(namespace) {
            return Err(ClusterError::Api("connection reset by peer".to_string()));
        }
        Ok(state.namespaces.get(namespace).cloned().unwrap_or_default())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ClusterError> {
        Ok(self.state.lock().nodes.clone())
    }
}

#[async_trait]
impl ClusterConnector for FakeClusterClient {
    async fn connect(&self, options: &KubectlOptions) -> Result<Arc<dyn ClusterClient>, ClusterError> {
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(ClusterError::Client("connection refused".to_string()));
        }
        state.connections.push(options.clone());
        drop(state);
        Ok(Arc::new(Self {
            state: Arc::clone(&self.state),
            namespace: options.namespace.clone(),
        }))
    }
}
