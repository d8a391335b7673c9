//! Terraform option bags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// The variables every module run receives.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVars {
    /// Cloud project id.
    pub project: String,
    /// Cloud region.
    pub region: String,
    /// Service account credentials; `None` means application-default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    /// Per-run identifier used to namespace resource names.
    pub unique_id: String,
}

impl ModuleVars {
    /// Creates module variables without explicit credentials.
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        region: impl Into<String>,
        unique_id: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            credentials: None,
            unique_id: unique_id.into(),
        }
    }

    /// Sets explicit credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Returns `(name, value)` pairs in the order they are passed.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![("project", self.project.as_str()), ("region", self.region.as_str())];
        if let Some(ref credentials) = self.credentials {
            pairs.push(("credentials", credentials.as_str()));
        }
        pairs.push(("unique_id", self.unique_id.as_str()));
        pairs
    }
}

impl fmt::Debug for ModuleVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleVars")
            .field("project", &self.project)
            .field("region", &self.region)
            .field(
                "credentials",
                &self.credentials.as_ref().map(|_| "<redacted>"),
            )
            .field("unique_id", &self.unique_id)
            .finish()
    }
}

fn default_binary() -> String {
    "terraform".to_string()
}

/// Everything needed to run terraform against one module copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerraformOptions {
    /// Module directory terraform runs in.
    pub terraform_dir: PathBuf,
    /// Standard module variables.
    pub vars: ModuleVars,
    /// Additional `-var` values.
    #[serde(default)]
    pub extra_vars: BTreeMap<String, String>,
    /// Extra environment variables for the terraform process.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Pass `-no-color`.
    #[serde(default)]
    pub no_color: bool,
    /// Terraform binary.
    #[serde(default = "default_binary")]
    pub binary: String,
}

impl TerraformOptions {
    /// Creates options for the module at `terraform_dir`.
    #[must_use]
    pub fn new(terraform_dir: impl AsRef<Path>, vars: ModuleVars) -> Self {
        Self {
            terraform_dir: terraform_dir.as_ref().to_path_buf(),
            vars,
            extra_vars: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            no_color: false,
            binary: default_binary(),
        }
    }

    /// Replaces the extra variables.
    #[must_use]
    pub fn with_extra_vars(mut self, extra_vars: BTreeMap<String, String>) -> Self {
        self.extra_vars = extra_vars;
        self
    }

    /// Adds one extra variable.
    #[must_use]
    pub fn with_extra_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_vars.insert(name.into(), value.into());
        self
    }

    /// Adds one environment variable.
    #[must_use]
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Enables `-no-color`.
    #[must_use]
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Overrides the terraform binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Renders every variable as `-var name=value` argument pairs.
    #[must_use]
    pub fn var_args(&self) -> Vec<String> {
        self.vars
            .pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .chain(self.extra_vars.iter().map(|(k, v)| (k.clone(), v.clone())))
            .flat_map(|(k, v)| ["-var".to_string(), format!("{k}={v}")])
            .collect()
    }
}
