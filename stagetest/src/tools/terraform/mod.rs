//! Terraform wrapper.
//!
//! Commands run in the module directory with the options' variables and
//! environment. Credentials are marked secret on every invocation so they
//! never reach logs or error messages.

mod lifecycle;
mod options;
mod plan;

pub use lifecycle::{LifecycleOp, ProvisioningLifecycle, ProvisioningState, PROVISIONING_STATE_KEY};
pub use options::{ModuleVars, TerraformOptions};
pub use plan::{PlanExpectation, ResourceCount};

use std::sync::Arc;
use tracing::{info, instrument};

use crate::errors::HarnessError;
use crate::tools::{CommandRunner, ShellCommand};

/// Runs terraform through a [`CommandRunner`].
#[derive(Clone)]
pub struct Terraform {
    runner: Arc<dyn CommandRunner>,
}

impl Terraform {
    /// Creates a wrapper around `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn command(options: &TerraformOptions, args: &[&str], with_vars: bool) -> ShellCommand {
        let mut command = ShellCommand::new(&options.binary)
            .args(args.iter().copied())
            .envs(&options.env_vars)
            .current_dir(&options.terraform_dir);
        if options.no_color {
            command = command.arg("-no-color");
        }
        if with_vars {
            command = command.args(options.var_args());
        }
        if let Some(ref credentials) = options.vars.credentials {
            command = command.secret(credentials.as_str());
        }
        command
    }

    async fn run(&self, command: ShellCommand) -> Result<String, HarnessError> {
        let output = self.runner.run(&command).await?;
        Ok(output.stdout)
    }

    /// `terraform init`.
    #[instrument(skip_all, fields(dir = %options.terraform_dir.display()))]
    pub async fn init(&self, options: &TerraformOptions) -> Result<String, HarnessError> {
        info!("Running terraform init");
        self.run(Self::command(options, &["init", "-upgrade=false", "-input=false"], false))
            .await
    }

    /// `terraform apply`.
    #[instrument(skip_all, fields(dir = %options.terraform_dir.display()))]
    pub async fn apply(&self, options: &TerraformOptions) -> Result<String, HarnessError> {
        info!("Running terraform apply");
        self.run(Self::command(
            options,
            &["apply", "-input=false", "-auto-approve", "-lock=false"],
            true,
        ))
        .await
    }

    /// `terraform init` followed by `terraform apply`.
    pub async fn init_and_apply(&self, options: &TerraformOptions) -> Result<String, HarnessError> {
        self.init(options).await?;
        self.apply(options).await
    }

    /// `terraform plan`; returns the plan text.
    #[instrument(skip_all, fields(dir = %options.terraform_dir.display()))]
    pub async fn plan(&self, options: &TerraformOptions) -> Result<String, HarnessError> {
        info!("Running terraform plan");
        self.run(Self::command(options, &["plan", "-input=false", "-lock=false"], true))
            .await
    }

    /// `terraform init` followed by `terraform plan`.
    pub async fn init_and_plan(&self, options: &TerraformOptions) -> Result<String, HarnessError> {
        self.init(options).await?;
        self.plan(options).await
    }

    /// `terraform destroy`.
    #[instrument(skip_all, fields(dir = %options.terraform_dir.display()))]
    pub async fn destroy(&self, options: &TerraformOptions) -> Result<String, HarnessError> {
        info!("Running terraform destroy");
        self.run(Self::command(
            options,
            &["destroy", "-auto-approve", "-input=false"],
            true,
        ))
        .await
    }

    /// Reads one output value.
    ///
    /// String outputs are returned unquoted, anything else as compact JSON.
    /// A missing or empty output is an error.
    #[instrument(skip(self, options), fields(dir = %options.terraform_dir.display()))]
    pub async fn output(&self, options: &TerraformOptions, key: &str) -> Result<String, HarnessError> {
        let command = ShellCommand::new(&options.binary)
            .args(["output", "-no-color", "-json", key])
            .envs(&options.env_vars)
            .current_dir(&options.terraform_dir);
        let raw = self.run(command).await?;

        let missing = || HarnessError::Parse {
            what: format!("terraform output '{key}'"),
        };
        let value: serde_json::Value = serde_json::from_str(raw.trim()).map_err(|_| missing())?;
        let value = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        if value.is_empty() {
            return Err(missing());
        }
        info!(%key, %value, "Read terraform output");
        Ok(value)
    }
}

impl std::fmt::Debug for Terraform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terraform").finish_non_exhaustive()
    }
}
