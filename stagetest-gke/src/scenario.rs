//! The GKE scenario stages.

use std::path::Path;
use tracing::info;

use stagetest::checks::Checks;
use stagetest::config::{Environment, HarnessConfig};
use stagetest::errors::HarnessError;
use stagetest::k8s::{verify_nodes_ready, verify_workloads, KubectlOptions, WorkloadExpectation};
use stagetest::scenario::{Scenario, ScenarioReport};
use stagetest::tools::terraform::{
    LifecycleOp, ModuleVars, ProvisioningLifecycle, TerraformOptions,
};
use stagetest::tools::{
    copy_home_kubeconfig_to_temp, copy_module_to_temp, gcloud, remove_file_if_exists, Toolchain,
};
use stagetest::utils::unique_id;

use crate::config::GkeScenarioConfig;

/// Copies the module into a temporary directory.
pub const CREATE_TEST_COPY: &str = "create_test_copy";
/// Builds and persists the terraform and kubectl options.
pub const CREATE_TERRATEST_OPTIONS: &str = "create_terratest_options";
/// Destroys the cluster and removes the temporary kubeconfig.
pub const CLEANUP: &str = "cleanup";
/// Runs `terraform init` and `terraform apply`.
pub const TERRAFORM_APPLY: &str = "terraform_apply";
/// Fetches cluster credentials into the temporary kubeconfig.
pub const CONFIGURE_KUBECTL: &str = "configure_kubectl";
/// Checks node readiness.
pub const WAIT_FOR_WORKERS: &str = "wait_for_workers";
/// Re-plans and compares with the plan expectation.
pub const TERRAFORM_VERIFY_PLAN_NOOP: &str = "terraform_verify_plan_noop";
/// Checks the Istio namespaces and pods.
pub const VERIFY_ISTIO: &str = "verify_istio";
/// Checks the cert-manager namespace and pods.
pub const VERIFY_CERT_MANAGER: &str = "verify cert-manager";

/// Scratch key of the module copy path.
pub const MODULE_PATH_KEY: &str = "gkeClusterTerraformModulePath";
/// Scratch key of the per-run unique id.
pub const UNIQUE_ID_KEY: &str = "uniqueID";
/// Scratch key of the project id.
pub const PROJECT_KEY: &str = "project";
/// Scratch key of the region.
pub const REGION_KEY: &str = "region";

/// Terraform output holding the cluster name.
pub const CLUSTER_NAME_OUTPUT: &str = "cluster_name";

/// The GKE end-to-end scenario.
#[derive(Debug, Clone)]
pub struct GkeScenario {
    config: GkeScenarioConfig,
    env: Environment,
    tools: Toolchain,
}

impl GkeScenario {
    /// Creates the scenario.
    #[must_use]
    pub fn new(config: GkeScenarioConfig, env: Environment, tools: Toolchain) -> Self {
        Self { config, env, tools }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GkeScenarioConfig {
        &self.config
    }

    /// Runs every stage in a scenario named after the test case.
    pub async fn run(&self, harness: &HarnessConfig) -> Result<ScenarioReport, HarnessError> {
        let scenario = Scenario::new(&self.config.test_name, harness)?;
        self.run_in(&scenario).await
    }

    /// Runs every stage in an existing scenario.
    pub async fn run_in(&self, scenario: &Scenario) -> Result<ScenarioReport, HarnessError> {
        scenario
            .run(|s| async move {
                s.stage(CREATE_TEST_COPY, async { self.create_test_copy(&s) })
                    .await?;
                s.stage(CREATE_TERRATEST_OPTIONS, async {
                    self.create_terratest_options(&s)
                })
                .await?;

                let tools = self.tools.clone();
                s.defer_stage(CLEANUP, move |s| cleanup(s, tools));

                s.stage(TERRAFORM_APPLY, self.terraform_apply(&s)).await?;
                s.stage(CONFIGURE_KUBECTL, self.configure_kubectl(&s)).await?;
                s.stage(WAIT_FOR_WORKERS, self.wait_for_workers(&s)).await?;
                s.stage(TERRAFORM_VERIFY_PLAN_NOOP, self.verify_plan_noop(&s))
                    .await?;
                s.stage(
                    VERIFY_ISTIO,
                    self.verify_workloads(&s, VERIFY_ISTIO, &self.config.istio),
                )
                .await?;
                s.stage(
                    VERIFY_CERT_MANAGER,
                    self.verify_workloads(&s, VERIFY_CERT_MANAGER, &self.config.cert_manager),
                )
                .await?;
                Ok(())
            })
            .await
    }

    fn create_test_copy(&self, s: &Scenario) -> Result<(), HarnessError> {
        let path = copy_module_to_temp(&self.config.module_dir, &self.config.test_name)?;
        info!(path = %path.display(), "Path to test folder");

        s.state().save_string(MODULE_PATH_KEY, &path.to_string_lossy())?;
        ProvisioningLifecycle::new(s.state().clone()).advance(LifecycleOp::Create)?;
        Ok(())
    }

    fn create_terratest_options(&self, s: &Scenario) -> Result<(), HarnessError> {
        let module_path = s.state().load_string(MODULE_PATH_KEY)?;
        let project = gcloud::project_from_env(&self.env)?;
        let credentials = gcloud::credentials_from_env(&self.env);
        let region = self.config.region.as_str();
        let id = unique_id();

        let kubeconfig = copy_home_kubeconfig_to_temp(&self.env)?;
        let kubectl = KubectlOptions::new(None, kubeconfig, &self.config.namespace);

        let mut vars = ModuleVars::new(&project, region, &id);
        if let Some(credentials) = credentials {
            vars = vars.with_credentials(credentials);
        }
        let options = TerraformOptions::new(module_path, vars)
            .with_extra_vars(self.config.extra_vars.clone())
            .with_no_color(self.config.no_color);
        info!(?options, "Terraform options");

        let state = s.state();
        state.save_string(UNIQUE_ID_KEY, &id)?;
        state.save_string(PROJECT_KEY, &project)?;
        state.save_string(REGION_KEY, region)?;
        state.save_terraform_options(&options)?;
        state.save_kubectl_options(&kubectl)?;
        Ok(())
    }

    async fn terraform_apply(&self, s: &Scenario) -> Result<(), HarnessError> {
        let options = s.state().load_terraform_options()?;
        let lifecycle = ProvisioningLifecycle::new(s.state().clone());

        lifecycle.ensure(LifecycleOp::Apply)?;
        self.tools.terraform().init_and_apply(&options).await?;
        lifecycle.advance(LifecycleOp::Apply)?;
        Ok(())
    }

    async fn configure_kubectl(&self, s: &Scenario) -> Result<(), HarnessError> {
        let state = s.state();
        let options = state.load_terraform_options()?;
        let kubectl = state.load_kubectl_options()?;
        let project = state.load_string(PROJECT_KEY)?;
        let region = state.load_string(REGION_KEY)?;

        let cluster = self
            .tools
            .terraform()
            .output(&options, CLUSTER_NAME_OUTPUT)
            .await?;
        info!(%cluster, %project, %region, "Configuring kubectl");

        gcloud::get_credentials(
            self.tools.runner.as_ref(),
            &cluster,
            &region,
            &project,
            &kubectl.config_path,
        )
        .await
    }

    async fn wait_for_workers(&self, s: &Scenario) -> Result<(), HarnessError> {
        let kubectl = s.state().load_kubectl_options()?;
        let client = self.tools.cluster.connect(&kubectl).await?;

        let mut checks = Checks::new(WAIT_FOR_WORKERS);
        verify_nodes_ready(client.as_ref(), self.config.min_nodes, &mut checks).await;
        checks.finish()
    }

    async fn verify_plan_noop(&self, s: &Scenario) -> Result<(), HarnessError> {
        let options = s.state().load_terraform_options()?;
        let lifecycle = ProvisioningLifecycle::new(s.state().clone());
        lifecycle.ensure(LifecycleOp::VerifyNoopPlan)?;

        let plan = self.tools.terraform().init_and_plan(&options).await?;

        let mut checks = Checks::new(TERRAFORM_VERIFY_PLAN_NOOP);
        self.config.plan.check(&mut checks, &plan);
        checks.finish()?;
        lifecycle.advance(LifecycleOp::VerifyNoopPlan)?;
        Ok(())
    }

    async fn verify_workloads(
        &self,
        s: &Scenario,
        stage: &str,
        expectations: &[WorkloadExpectation],
    ) -> Result<(), HarnessError> {
        let kubectl = s.state().load_kubectl_options()?;

        let mut checks = Checks::new(stage);
        verify_workloads(self.tools.cluster.as_ref(), &kubectl, expectations, &mut checks).await;
        checks.finish()
    }
}

/// Destroys the cluster, then removes the temporary kubeconfig even if the
/// destroy failed.
async fn cleanup(s: Scenario, tools: Toolchain) -> Result<(), HarnessError> {
    let destroyed = destroy(&s, &tools).await;
    let removed = remove_kubeconfig(&s);

    match HarnessError::combine(destroyed.err(), removed.err()) {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

async fn destroy(s: &Scenario, tools: &Toolchain) -> Result<(), HarnessError> {
    let options = s.state().load_terraform_options()?;
    let lifecycle = ProvisioningLifecycle::new(s.state().clone());

    lifecycle.ensure(LifecycleOp::Destroy)?;
    tools.terraform().destroy(&options).await?;
    lifecycle.advance(LifecycleOp::Destroy)?;
    Ok(())
}

fn remove_kubeconfig(s: &Scenario) -> Result<(), HarnessError> {
    let kubectl = s.state().load_kubectl_options()?;
    let path: &Path = &kubectl.config_path;
    remove_file_if_exists(path)?;

    let mut checks = Checks::new(CLEANUP);
    checks.check(
        !path.exists(),
        format!("temporary kubeconfig {} still exists", path.display()),
    );
    checks.finish()
}
