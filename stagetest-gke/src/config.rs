//! Scenario configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use stagetest::config::Environment;
use stagetest::k8s::WorkloadExpectation;
use stagetest::tools::terraform::PlanExpectation;

/// Variable overriding the module source directory.
pub const MODULE_DIR_VAR: &str = "GKE_MODULE_DIR";

/// Default test case name; also the working directory name.
pub const DEFAULT_TEST_NAME: &str = "gke_test";

/// Default region.
pub const DEFAULT_REGION: &str = "asia-southeast2";

/// Namespace the kubeconfig defaults to.
pub const DEFAULT_NAMESPACE: &str = "kube-system";

fn default_module_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("gcp-gke")
}

/// Everything that varies between runs of the GKE scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GkeScenarioConfig {
    /// Test case name.
    pub test_name: String,
    /// Terraform module to copy and apply.
    pub module_dir: PathBuf,
    /// Region the cluster is created in.
    pub region: String,
    /// Default namespace of the kubeconfig.
    pub namespace: String,
    /// Minimum number of ready nodes.
    pub min_nodes: usize,
    /// What a re-plan of the applied module must show.
    pub plan: PlanExpectation,
    /// Workloads checked by `verify_istio`.
    pub istio: Vec<WorkloadExpectation>,
    /// Workloads checked by `verify cert-manager`.
    pub cert_manager: Vec<WorkloadExpectation>,
    /// Additional module variables.
    pub extra_vars: BTreeMap<String, String>,
    /// Pass `-no-color` to terraform.
    pub no_color: bool,
}

impl Default for GkeScenarioConfig {
    fn default() -> Self {
        Self::new(default_module_dir())
    }
}

impl GkeScenarioConfig {
    /// Creates the default configuration for the module at `module_dir`.
    #[must_use]
    pub fn new(module_dir: impl Into<PathBuf>) -> Self {
        Self {
            test_name: DEFAULT_TEST_NAME.to_string(),
            module_dir: module_dir.into(),
            region: DEFAULT_REGION.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            min_nodes: 1,
            plan: PlanExpectation::gke_module(),
            istio: WorkloadExpectation::istio(),
            cert_manager: WorkloadExpectation::cert_manager(),
            extra_vars: BTreeMap::new(),
            no_color: true,
        }
    }

    /// The default configuration, with the module directory taken from
    /// `GKE_MODULE_DIR` when set.
    #[must_use]
    pub fn from_environment(env: &Environment) -> Self {
        env.get(MODULE_DIR_VAR)
            .map_or_else(Self::default, Self::new)
    }

    /// Sets the test case name.
    #[must_use]
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = name.into();
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Sets the minimum node count.
    #[must_use]
    pub fn with_min_nodes(mut self, min_nodes: usize) -> Self {
        self.min_nodes = min_nodes;
        self
    }

    /// Sets the plan expectation for the module version under test.
    #[must_use]
    pub fn with_plan(mut self, plan: PlanExpectation) -> Self {
        self.plan = plan;
        self
    }

    /// Adds a module variable.
    #[must_use]
    pub fn with_extra_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_vars.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GkeScenarioConfig::default();
        assert_eq!(config.test_name, "gke_test");
        assert_eq!(config.region, "asia-southeast2");
        assert_eq!(config.namespace, "kube-system");
        assert!(config.module_dir.ends_with("gcp-gke"));
        assert_eq!(config.plan, PlanExpectation::gke_module());
        assert_eq!(config.istio.len(), 2);
        assert!(config.cert_manager.iter().all(|w| w.require_pods));
    }

    #[test]
    fn test_module_dir_override() {
        let env = Environment::from_pairs([(MODULE_DIR_VAR, "/srv/modules/gcp-gke")]);
        let config = GkeScenarioConfig::from_environment(&env);
        assert_eq!(config.module_dir, PathBuf::from("/srv/modules/gcp-gke"));
    }
}
