//! Cluster client connection options.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How to reach the cluster: a kubeconfig file, an optional context and the
/// namespace queries default to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubectlOptions {
    /// Context to use; `None` means the kubeconfig's current context.
    #[serde(default)]
    pub context: Option<String>,
    /// Path to the kubeconfig file.
    pub config_path: PathBuf,
    /// Default namespace.
    pub namespace: String,
}

impl KubectlOptions {
    /// Creates connection options.
    #[must_use]
    pub fn new(
        context: Option<String>,
        config_path: impl AsRef<Path>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            context,
            config_path: config_path.as_ref().to_path_buf(),
            namespace: namespace.into(),
        }
    }

    /// Returns a copy targeting another namespace.
    #[must_use]
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..self.clone()
        }
    }
}
