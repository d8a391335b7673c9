//! Throwaway workspaces for scenario tests.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::{Environment, HarnessConfig, SkipToggles};
use crate::errors::HarnessError;

const FAKE_KUBECONFIG: &str = "apiVersion: v1\nkind: Config\nclusters: []\ncontexts: []\nusers: []\n";

/// A temporary directory holding a fake terraform module, a fake user
/// kubeconfig and the scenario working root.
///
/// Everything is removed when the workspace is dropped.
#[derive(Debug)]
pub struct TestWorkspace {
    root: TempDir,
    module_dir: PathBuf,
    kubeconfig: PathBuf,
}

impl TestWorkspace {
    /// Creates a workspace with a module named `gcp-gke`.
    pub fn new() -> Result<Self, HarnessError> {
        Self::with_module_name("gcp-gke")
    }

    /// Creates a workspace with a module named `module_name`.
    pub fn with_module_name(module_name: &str) -> Result<Self, HarnessError> {
        let root = tempfile::Builder::new().prefix("stagetest-").tempdir()?;

        let module_dir = root.path().join("src").join(module_name);
        fs::create_dir_all(module_dir.join(".terraform"))?;
        fs::write(module_dir.join("main.tf"), "module \"gke\" {}\n")?;
        fs::write(module_dir.join("variables.tf"), "variable \"project\" {}\n")?;
        fs::write(module_dir.join("terraform.tfstate"), "{}\n")?;

        let kubeconfig = root.path().join("home-kubeconfig");
        fs::write(&kubeconfig, FAKE_KUBECONFIG)?;

        Ok(Self {
            root,
            module_dir,
            kubeconfig,
        })
    }

    /// Root of the workspace.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// The fake module directory.
    #[must_use]
    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// The fake user kubeconfig.
    #[must_use]
    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }

    /// Root of the scenario working directories.
    #[must_use]
    pub fn working_root(&self) -> PathBuf {
        self.root.path().join("test-runs")
    }

    /// Harness configuration rooted in this workspace, skipping nothing.
    #[must_use]
    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig::new(self.working_root())
    }

    /// Harness configuration skipping `stages`.
    #[must_use]
    pub fn harness_config_skipping(&self, stages: &[&str]) -> HarnessConfig {
        let skip = stages
            .iter()
            .fold(SkipToggles::none(), |skip, stage| skip.skip(*stage));
        self.harness_config().with_skip(skip)
    }

    /// An environment with a project id and `KUBECONFIG` pointing here.
    #[must_use]
    pub fn environment(&self) -> Environment {
        Environment::from_pairs([
            ("GOOGLE_PROJECT", "stagetest-project".to_string()),
            ("KUBECONFIG", self.kubeconfig.to_string_lossy().into_owned()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_layout() {
        let ws = TestWorkspace::new().unwrap();
        assert!(ws.module_dir().join("main.tf").is_file());
        assert!(ws.module_dir().ends_with("gcp-gke"));
        assert!(ws.kubeconfig().is_file());
        assert_eq!(ws.environment().get("GOOGLE_PROJECT"), Some("stagetest-project"));
        assert!(ws
            .harness_config_skipping(&["cleanup"])
            .skip
            .is_skipped("cleanup"));
    }

    #[test]
    fn test_workspace_is_removed_on_drop() {
        let ws = TestWorkspace::new().unwrap();
        let root = ws.root().to_path_buf();
        drop(ws);
        assert!(!root.exists());
    }
}
