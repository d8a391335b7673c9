//! External tool wrappers.
//!
//! Every subprocess goes through the [`CommandRunner`] seam and every cluster
//! query through [`ClusterConnector`], so scenarios can run against scripted
//! doubles as well as real tools.

mod files;
pub mod gcloud;
mod runner;
pub mod terraform;

pub use files::{copy_home_kubeconfig_to_temp, copy_module_to_temp, remove_file_if_exists};
#[cfg(test)]
pub use runner::MockCommandRunner;
pub use runner::{CommandOutput, CommandRunner, ShellCommand, SystemRunner};

use std::sync::Arc;

use crate::k8s::ClusterConnector;
use terraform::Terraform;

/// The external systems a scenario talks to.
#[derive(Clone)]
pub struct Toolchain {
    /// Runs terraform and gcloud.
    pub runner: Arc<dyn CommandRunner>,
    /// Opens cluster API clients.
    pub cluster: Arc<dyn ClusterConnector>,
}

impl Toolchain {
    /// Creates a toolchain from explicit parts.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, cluster: Arc<dyn ClusterConnector>) -> Self {
        Self { runner, cluster }
    }

    /// Real subprocesses and a real Kubernetes client.
    #[cfg(feature = "kube-client")]
    #[must_use]
    pub fn system() -> Self {
        Self::new(
            Arc::new(SystemRunner),
            Arc::new(crate::k8s::KubeConnector),
        )
    }

    /// Returns a terraform wrapper sharing this toolchain's runner.
    #[must_use]
    pub fn terraform(&self) -> Terraform {
        Terraform::new(self.runner.clone())
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain").finish_non_exhaustive()
    }
}
