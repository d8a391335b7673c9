//! GKE scenario tests.
//!
//! Everything except `real_gke_cluster` runs against a scripted command
//! runner and an in-memory cluster.

use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stagetest::prelude::*;
use stagetest::testing::{
    assert_all_passed, assert_stage_order, assert_stage_skipped, assert_stage_status,
    FakeClusterClient, ScriptedRunner, TestWorkspace,
};
use stagetest_gke::scenario::{
    CLEANUP, CONFIGURE_KUBECTL, CREATE_TERRATEST_OPTIONS, CREATE_TEST_COPY, MODULE_PATH_KEY,
    PROJECT_KEY, REGION_KEY, TERRAFORM_APPLY, TERRAFORM_VERIFY_PLAN_NOOP, UNIQUE_ID_KEY,
    VERIFY_CERT_MANAGER, VERIFY_ISTIO, WAIT_FOR_WORKERS,
};
use stagetest_gke::{GkeScenario, GkeScenarioConfig};

const CLUSTER: &str = "gke-test-cluster";

struct Harness {
    ws: TestWorkspace,
    runner: Arc<ScriptedRunner>,
    cluster: FakeClusterClient,
}

impl Harness {
    fn new(runner: ScriptedRunner, cluster: FakeClusterClient) -> Self {
        Self {
            ws: TestWorkspace::new().unwrap(),
            runner: Arc::new(runner),
            cluster,
        }
    }

    fn healthy() -> Self {
        Self::new(ScriptedRunner::gke_defaults(CLUSTER), FakeClusterClient::gke_healthy())
    }

    fn toolchain(&self) -> Toolchain {
        Toolchain::new(self.runner.clone(), Arc::new(self.cluster.clone()))
    }

    fn scenario(&self) -> GkeScenario {
        self.scenario_with_env(self.ws.environment())
    }

    fn scenario_with_env(&self, env: Environment) -> GkeScenario {
        GkeScenario::new(
            GkeScenarioConfig::new(self.ws.module_dir()).with_min_nodes(3),
            env,
            self.toolchain(),
        )
    }

    fn state(&self) -> ScratchState {
        ScratchState::new(self.ws.harness_config().working_dir("gke_test"))
    }

    fn kubeconfig_path(&self) -> PathBuf {
        self.state().load_kubectl_options().unwrap().config_path
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Ok(path) = self.state().load_string(MODULE_PATH_KEY) {
            if let Some(copy_root) = Path::new(&path).parent() {
                let _ = std::fs::remove_dir_all(copy_root);
            }
        }
    }
}

fn position(calls: &[String], needle: &str) -> usize {
    calls
        .iter()
        .position(|c| c.contains(needle))
        .unwrap_or_else(|| panic!("no call containing '{needle}' in {calls:#?}"))
}

#[tokio::test]
async fn test_full_run_provisions_verifies_and_tears_down() {
    let h = Harness::healthy();

    let report = h.scenario().run(&h.ws.harness_config()).await.unwrap();

    assert_all_passed(&report);
    assert_stage_order(
        &report,
        &[
            CREATE_TEST_COPY,
            CREATE_TERRATEST_OPTIONS,
            TERRAFORM_APPLY,
            CONFIGURE_KUBECTL,
            WAIT_FOR_WORKERS,
            TERRAFORM_VERIFY_PLAN_NOOP,
            VERIFY_ISTIO,
            VERIFY_CERT_MANAGER,
            CLEANUP,
        ],
    );

    let calls = h.runner.rendered_calls();
    assert!(position(&calls, "terraform init") < position(&calls, "terraform apply"));
    assert!(position(&calls, "terraform apply") < position(&calls, "terraform output"));
    assert!(position(&calls, "terraform output") < position(&calls, "get-credentials"));
    assert!(position(&calls, "terraform plan") < position(&calls, "terraform destroy"));
    assert_eq!(h.runner.count_matching("terraform init"), 2);
    assert_eq!(h.runner.count_matching("terraform destroy"), 1);

    let kubeconfig = h.kubeconfig_path();
    let gcloud = h
        .runner
        .calls()
        .into_iter()
        .find(|c| c.program == "gcloud")
        .unwrap();
    assert_eq!(
        gcloud.args,
        vec![
            "container",
            "clusters",
            "get-credentials",
            CLUSTER,
            "--region",
            "asia-southeast2",
            "--project",
            "stagetest-project",
            "--quiet",
        ]
    );
    assert_eq!(
        gcloud.env.get("KUBECONFIG").map(PathBuf::from),
        Some(kubeconfig.clone())
    );
    assert!(!kubeconfig.exists(), "temporary kubeconfig was not removed");

    assert_eq!(
        h.cluster.pod_queries(),
        vec!["istio-system".to_string(), "cert-manager".to_string()]
    );
    let connections = h.cluster.connections();
    let namespaces: Vec<_> = connections.iter().map(|o| o.namespace.as_str()).collect();
    assert_eq!(
        namespaces,
        vec!["kube-system", "istio-operator", "istio-system", "cert-manager"]
    );
    assert!(connections.iter().all(|o| o.config_path == kubeconfig));

    let state = h.state();
    assert_eq!(state.load_string(PROJECT_KEY).unwrap(), "stagetest-project");
    assert_eq!(state.load_string(REGION_KEY).unwrap(), "asia-southeast2");
    assert_eq!(state.load_string(UNIQUE_ID_KEY).unwrap().len(), 6);
    assert_eq!(
        ProvisioningLifecycle::new(state).current().unwrap(),
        ProvisioningState::Destroyed
    );
}

#[tokio::test]
async fn test_module_copy_leaves_local_state_behind() {
    let h = Harness::healthy();
    h.scenario().run(&h.ws.harness_config()).await.unwrap();

    let copy = PathBuf::from(h.state().load_string(MODULE_PATH_KEY).unwrap());
    assert_ne!(copy, h.ws.module_dir());
    assert!(copy.ends_with("gcp-gke"));
    assert!(copy.join("main.tf").is_file());
    assert!(!copy.join("terraform.tfstate").exists());
    assert!(!copy.join(".terraform").exists());

    let options = h.state().load_terraform_options().unwrap();
    assert_eq!(options.terraform_dir, copy);
    assert!(h
        .runner
        .calls()
        .iter()
        .filter(|c| c.program == "terraform")
        .all(|c| c.working_dir.as_deref() == Some(copy.as_path())));
}

#[tokio::test]
async fn test_cleanup_runs_after_apply_failure() {
    let h = Harness::new(
        ScriptedRunner::gke_defaults(CLUSTER).fail_on("terraform apply", 1, "Error: quota exceeded"),
        FakeClusterClient::gke_healthy(),
    );
    let scenario = Scenario::new("gke_test", &h.ws.harness_config()).unwrap();

    let err = h.scenario().run_in(&scenario).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::ExternalTool);
    assert!(err.to_string().contains("quota exceeded"));

    let report = scenario.report();
    assert_stage_status(&report, TERRAFORM_APPLY, StageStatus::Fail);
    assert_stage_status(&report, CONFIGURE_KUBECTL, StageStatus::Pending);
    assert_stage_status(&report, CLEANUP, StageStatus::Ok);

    assert_eq!(h.runner.count_matching("terraform destroy"), 1);
    assert_eq!(h.runner.count_matching("gcloud"), 0);
    assert!(!h.kubeconfig_path().exists());
}

#[tokio::test]
async fn test_destroy_failure_still_removes_kubeconfig() {
    let h = Harness::new(
        ScriptedRunner::gke_defaults(CLUSTER).fail_on("terraform destroy", 1, "Error: timeout"),
        FakeClusterClient::gke_healthy(),
    );

    let err = h.scenario().run(&h.ws.harness_config()).await.unwrap_err();

    match err {
        HarnessError::StageFailed { ref stage, .. } => assert_eq!(stage, CLEANUP),
        ref other => panic!("expected the cleanup stage to fail, got {other:?}"),
    }
    assert!(!h.kubeconfig_path().exists());
    assert_eq!(
        ProvisioningLifecycle::new(h.state()).current().unwrap(),
        ProvisioningState::Verified
    );
}

#[tokio::test]
async fn test_plan_drift_fails_its_stage_but_verification_continues() {
    let h = Harness::new(
        ScriptedRunner::gke_defaults(CLUSTER)
            .on("terraform plan", "Plan: 5 to add, 1 to change, 4 to destroy."),
        FakeClusterClient::gke_healthy(),
    );
    let scenario = Scenario::new("gke_test", &h.ws.harness_config()).unwrap();

    let err = h.scenario().run_in(&scenario).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Assertion);
    let failures: Vec<String> = err
        .assertion_failures()
        .iter()
        .map(|f| f.message.clone())
        .collect();
    assert!(failures.iter().any(|m| m.starts_with("resources to change")));
    assert!(failures.iter().any(|m| m.starts_with("resources to add")));
    assert!(failures.iter().any(|m| m.contains("setup_gcloud_cli")));

    let report = scenario.report();
    assert_stage_status(&report, TERRAFORM_VERIFY_PLAN_NOOP, StageStatus::Fail);
    assert_stage_status(&report, VERIFY_ISTIO, StageStatus::Ok);
    assert_stage_status(&report, VERIFY_CERT_MANAGER, StageStatus::Ok);
    assert_stage_status(&report, CLEANUP, StageStatus::Ok);
    assert_eq!(
        h.cluster.pod_queries(),
        vec!["istio-system".to_string(), "cert-manager".to_string()]
    );
    assert_eq!(h.runner.count_matching("terraform destroy"), 1);
    assert_eq!(
        ProvisioningLifecycle::new(h.state()).current().unwrap(),
        ProvisioningState::Destroyed
    );
}

#[tokio::test]
async fn test_missing_istio_still_verifies_cert_manager() {
    let h = Harness::new(
        ScriptedRunner::gke_defaults(CLUSTER),
        FakeClusterClient::new()
            .with_nodes(3, true)
            .with_namespace("istio-system")
            .with_pods("cert-manager", 2),
    );
    let scenario = Scenario::new("gke_test", &h.ws.harness_config()).unwrap();

    let err = h.scenario().run_in(&scenario).await.unwrap_err();

    let failures: Vec<String> = err
        .assertion_failures()
        .iter()
        .map(|f| f.message.clone())
        .collect();
    assert_eq!(
        failures,
        vec![
            "Could not find istio-operator namespace".to_string(),
            "no Pods present in istio-system namespace".to_string(),
        ]
    );
    let report = scenario.report();
    assert_stage_status(&report, VERIFY_ISTIO, StageStatus::Fail);
    assert_stage_status(&report, VERIFY_CERT_MANAGER, StageStatus::Ok);
    assert_stage_status(&report, CLEANUP, StageStatus::Ok);
    assert_eq!(
        h.cluster.pod_queries(),
        vec!["istio-system".to_string(), "cert-manager".to_string()]
    );
}

#[tokio::test]
async fn test_every_failed_verification_is_reported() {
    let h = Harness::new(
        ScriptedRunner::gke_defaults(CLUSTER),
        FakeClusterClient::new()
            .with_nodes(3, true)
            .with_namespace("istio-operator")
            .with_namespace("istio-system"),
    );
    let scenario = Scenario::new("gke_test", &h.ws.harness_config()).unwrap();

    let err = h.scenario().run_in(&scenario).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Assertion);
    assert!(matches!(err, HarnessError::Multiple(ref errors) if errors.len() == 2));
    let failures: Vec<String> = err
        .assertion_failures()
        .iter()
        .map(|f| f.message.clone())
        .collect();
    assert_eq!(
        failures,
        vec![
            "no Pods present in istio-system namespace".to_string(),
            "Could not find cert-manager namespace".to_string(),
            "no Pods present in cert-manager namespace".to_string(),
        ]
    );
    let report = scenario.report();
    assert_stage_status(&report, VERIFY_ISTIO, StageStatus::Fail);
    assert_stage_status(&report, VERIFY_CERT_MANAGER, StageStatus::Fail);
    assert_stage_status(&report, CLEANUP, StageStatus::Ok);
}

#[tokio::test]
async fn test_missing_project_is_a_setup_error() {
    let h = Harness::healthy();
    let env = Environment::from_pairs([(
        "KUBECONFIG",
        h.ws.kubeconfig().to_string_lossy().into_owned(),
    )]);

    let err = h
        .scenario_with_env(env)
        .run(&h.ws.harness_config())
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Setup);
    assert!(matches!(err.root(), HarnessError::MissingEnv { .. }));
    assert!(h.runner.calls().is_empty());
    assert!(!h.state().contains("KubectlOptions").unwrap());
}

#[tokio::test]
async fn test_resume_across_invocations_with_skip_toggles() {
    let h = Harness::healthy();

    // First invocation provisions and verifies but keeps the cluster.
    let keep = h.ws.harness_config_skipping(&[CLEANUP]);
    let first = h.scenario().run(&keep).await.unwrap();
    assert_stage_skipped(&first, CLEANUP);
    assert_eq!(h.runner.count_matching("terraform destroy"), 0);
    let kubeconfig = h.kubeconfig_path();
    assert!(kubeconfig.exists());

    // Second invocation only tears down, driven by SKIP_ variables.
    let env = h
        .ws
        .environment()
        .with_var("STAGETEST_WORKING_ROOT", h.ws.working_root().to_string_lossy())
        .with_var("SKIP_create_test_copy", "true")
        .with_var("SKIP_create_terratest_options", "true")
        .with_var("SKIP_terraform_apply", "true")
        .with_var("SKIP_configure_kubectl", "true")
        .with_var("SKIP_wait_for_workers", "true")
        .with_var("SKIP_terraform_verify_plan_noop", "true")
        .with_var("SKIP_verify_istio", "true")
        .with_var("SKIP_verify_cert_manager", "true");
    let harness = HarnessConfig::from_environment(&env);
    let sink = Arc::new(CollectingEventSink::new());
    let scenario = Scenario::with_sink("gke_test", &harness, sink.clone()).unwrap();

    let runner = Arc::new(ScriptedRunner::gke_defaults(CLUSTER));
    let tools = Toolchain::new(runner.clone(), Arc::new(h.cluster.clone()));
    let second = GkeScenario::new(GkeScenarioConfig::new(h.ws.module_dir()), env, tools)
        .run_in(&scenario)
        .await
        .unwrap();

    assert_eq!(second.skipped(), 8);
    assert_stage_status(&second, CLEANUP, StageStatus::Ok);
    assert_eq!(sink.stages_with(StageEventKind::Skipped).len(), 8);
    assert_eq!(runner.rendered_calls().len(), 1);
    assert!(runner.rendered_calls()[0].starts_with("terraform destroy"));
    assert!(!kubeconfig.exists());
}

#[tokio::test]
async fn test_kubeconfig_removal_failure_fails_cleanup() {
    let h = Harness::healthy();

    let keep = h.ws.harness_config_skipping(&[CLEANUP]);
    h.scenario().run(&keep).await.unwrap();
    std::fs::remove_file(h.kubeconfig_path()).unwrap();

    // A directory in place of the kubeconfig cannot be removed as a file.
    let blocked = h.ws.root().join("kubeconfig-dir");
    std::fs::create_dir_all(&blocked).unwrap();
    let kubectl = h.state().load_kubectl_options().unwrap();
    h.state()
        .save_kubectl_options(&KubectlOptions::new(None, &blocked, &kubectl.namespace))
        .unwrap();

    let teardown_only = h.ws.harness_config_skipping(&[
        CREATE_TEST_COPY,
        CREATE_TERRATEST_OPTIONS,
        TERRAFORM_APPLY,
        CONFIGURE_KUBECTL,
        WAIT_FOR_WORKERS,
        TERRAFORM_VERIFY_PLAN_NOOP,
        VERIFY_ISTIO,
        VERIFY_CERT_MANAGER,
    ]);
    let scenario = Scenario::new("gke_test", &teardown_only).unwrap();
    let err = h.scenario().run_in(&scenario).await.unwrap_err();

    match err {
        HarnessError::StageFailed { ref stage, .. } => assert_eq!(stage, CLEANUP),
        ref other => panic!("expected the cleanup stage to fail, got {other:?}"),
    }
    assert!(matches!(err.root(), HarnessError::Io(_)));
    assert_eq!(err.category(), ErrorCategory::Setup);
    assert_stage_status(&scenario.report(), CLEANUP, StageStatus::Fail);
    assert_eq!(h.runner.count_matching("terraform destroy"), 1);
    assert_eq!(
        ProvisioningLifecycle::new(h.state()).current().unwrap(),
        ProvisioningState::Destroyed
    );
    assert!(blocked.is_dir());
}

/// Provisions a real cluster. Needs terraform, gcloud, a project id in one of
/// the `GOOGLE_PROJECT` variables, and the module at `GKE_MODULE_DIR` or
/// `../gcp-gke`.
#[tokio::test]
#[ignore = "provisions real GKE infrastructure"]
async fn real_gke_cluster() {
    let env = Environment::capture();
    let harness = HarnessConfig::from_environment(&env);
    init_logging(harness.log_format);

    let config = GkeScenarioConfig::from_environment(&env);
    let report = GkeScenario::new(config, env, Toolchain::system())
        .run(&harness)
        .await
        .unwrap();
    assert_all_passed(&report);
}
