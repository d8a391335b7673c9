//! Google Cloud CLI helpers.

use std::path::Path;
use tracing::{info, instrument};

use crate::config::Environment;
use crate::errors::HarnessError;
use crate::tools::{CommandRunner, ShellCommand};

/// Variables that may hold the project id, in lookup order.
pub const PROJECT_ENV_VARS: [&str; 5] = [
    "GOOGLE_PROJECT",
    "GOOGLE_CLOUD_PROJECT",
    "GOOGLE_CLOUD_PROJECT_ID",
    "GCLOUD_PROJECT",
    "CLOUDSDK_CORE_PROJECT",
];

/// Variables that may hold service account credentials, in lookup order.
pub const CREDENTIALS_ENV_VARS: [&str; 3] = [
    "GOOGLE_CREDENTIALS",
    "GOOGLE_CLOUD_KEYFILE_JSON",
    "GCLOUD_KEYFILE_JSON",
];

/// Returns the project id, or a setup error naming every accepted variable.
pub fn project_from_env(env: &Environment) -> Result<String, HarnessError> {
    env.require_any(&PROJECT_ENV_VARS)
}

/// Returns explicit credentials, if any.
///
/// `None` means the tools fall back to application-default credentials.
#[must_use]
pub fn credentials_from_env(env: &Environment) -> Option<String> {
    env.first_of(&CREDENTIALS_ENV_VARS)
        .map(|(_, value)| value.to_string())
}

/// Builds the `get-credentials` invocation writing into `kubeconfig`.
#[must_use]
pub fn get_credentials_command(
    cluster: &str,
    region: &str,
    project: &str,
    kubeconfig: &Path,
) -> ShellCommand {
    ShellCommand::new("gcloud")
        .args([
            "container",
            "clusters",
            "get-credentials",
            cluster,
            "--region",
            region,
            "--project",
            project,
            "--quiet",
        ])
        .env("KUBECONFIG", kubeconfig.to_string_lossy())
}

/// Fetches cluster credentials into `kubeconfig`.
#[instrument(skip(runner, kubeconfig), fields(kubeconfig = %kubeconfig.display()))]
pub async fn get_credentials(
    runner: &dyn CommandRunner,
    cluster: &str,
    region: &str,
    project: &str,
    kubeconfig: &Path,
) -> Result<(), HarnessError> {
    let command = get_credentials_command(cluster, region, project, kubeconfig);
    runner.run(&command).await?;
    info!("Fetched cluster credentials");
    Ok(())
}
