//! Configuration types for stagetest.
//!
//! The harness never reads the process environment on its own. Callers take a
//! snapshot with [`Environment::capture`] and derive typed configuration from
//! it, which keeps stage gating testable in isolation.
//!
//! # Example
//!
//! ```
//! use stagetest::config::{Environment, HarnessConfig, SkipToggles};
//!
//! let env = Environment::from_pairs([("SKIP_terraform_apply", "true")]);
//! let config = HarnessConfig::from_environment(&env);
//! assert!(config.skip.is_skipped("terraform_apply"));
//!
//! let config = HarnessConfig::new("target/test-runs")
//!     .with_skip(SkipToggles::none().skip("cleanup"));
//! assert!(config.skip.is_skipped("cleanup"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::errors::HarnessError;

/// Prefix of the per-stage skip variables.
pub const SKIP_PREFIX: &str = "SKIP_";

/// Variable overriding the working root.
pub const WORKING_ROOT_VAR: &str = "STAGETEST_WORKING_ROOT";

/// Variable selecting the log format.
pub const LOG_FORMAT_VAR: &str = "STAGETEST_LOG_FORMAT";

/// Default root under which per-scenario working directories are created.
pub const DEFAULT_WORKING_ROOT: &str = "test-runs";

/// An immutable snapshot of environment variables.
///
/// Empty values are treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Captures the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Builds an environment from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns a copy with one more variable set.
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Gets a non-empty variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Returns the first non-empty variable among `names`, with its name.
    #[must_use]
    pub fn first_of<'a>(&'a self, names: &[&'a str]) -> Option<(&'a str, &'a str)> {
        names
            .iter()
            .find_map(|name| self.get(name).map(|value| (*name, value)))
    }

    /// Like [`Environment::first_of`], but a missing value is a setup error.
    pub fn require_any(&self, names: &[&str]) -> Result<String, HarnessError> {
        self.first_of(names)
            .map(|(_, value)| value.to_string())
            .ok_or_else(|| HarnessError::MissingEnv {
                names: names.iter().map(ToString::to_string).collect(),
            })
    }

    /// Iterates over all non-empty variables.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The set of stages to skip on this run ("replay mode").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipToggles {
    stages: BTreeSet<String>,
}

impl SkipToggles {
    /// No stage is skipped.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds a stage to skip.
    #[must_use]
    pub fn skip(mut self, stage: impl Into<String>) -> Self {
        self.stages.insert(stage.into());
        self
    }

    /// Collects every non-empty `SKIP_<stage>` variable.
    #[must_use]
    pub fn from_environment(env: &Environment) -> Self {
        Self {
            stages: env
                .iter()
                .filter_map(|(k, _)| k.strip_prefix(SKIP_PREFIX))
                .filter(|stage| !stage.is_empty())
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Returns true if the named stage must not run.
    ///
    /// Matches the stage name verbatim or in its normalized form, so
    /// `SKIP_verify_cert_manager` also skips `verify cert-manager`.
    #[must_use]
    pub fn is_skipped(&self, stage: &str) -> bool {
        self.stages.contains(stage) || self.stages.contains(&normalize_stage_name(stage))
    }

    /// Returns the environment variable that skips the named stage.
    #[must_use]
    pub fn variable_for(stage: &str) -> String {
        format!("{SKIP_PREFIX}{stage}")
    }

    /// Returns true if nothing is skipped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Replaces every character that is awkward in a variable name with `_`.
#[must_use]
pub fn normalize_stage_name(stage: &str) -> String {
    stage
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" | "text" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Harness-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Root under which `<root>/<scenario>` working directories live.
    pub working_root: PathBuf,
    /// Stages to skip on this run.
    pub skip: SkipToggles,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WORKING_ROOT)
    }
}

impl HarnessConfig {
    /// Creates a config rooted at `working_root`, skipping nothing.
    #[must_use]
    pub fn new(working_root: impl Into<PathBuf>) -> Self {
        Self {
            working_root: working_root.into(),
            skip: SkipToggles::none(),
            log_format: LogFormat::default(),
        }
    }

    /// Derives the configuration from an environment snapshot.
    #[must_use]
    pub fn from_environment(env: &Environment) -> Self {
        let working_root = env
            .get(WORKING_ROOT_VAR)
            .map_or_else(|| PathBuf::from(DEFAULT_WORKING_ROOT), PathBuf::from);
        let log_format = env
            .get(LOG_FORMAT_VAR)
            .and_then(LogFormat::parse)
            .unwrap_or_default();

        Self {
            working_root,
            skip: SkipToggles::from_environment(env),
            log_format,
        }
    }

    /// Sets the skip toggles.
    #[must_use]
    pub fn with_skip(mut self, skip: SkipToggles) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the log format.
    #[must_use]
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Returns the working directory of the named scenario.
    #[must_use]
    pub fn working_dir(&self, scenario: &str) -> PathBuf {
        self.working_root.join(scenario)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_ignores_empty_values() {
        let env = Environment::from_pairs([("A", ""), ("B", "b")]);
        assert_eq!(env.get("A"), None);
        assert_eq!(env.get("B"), Some("b"));
        assert_eq!(env.iter().count(), 1);
    }

    #[test]
    fn test_first_of_respects_order() {
        let env = Environment::from_pairs([("SECOND", "2"), ("THIRD", "3")]);
        assert_eq!(
            env.first_of(&["FIRST", "SECOND", "THIRD"]),
            Some(("SECOND", "2"))
        );
    }

    #[test]
    fn test_require_any_missing() {
        let env = Environment::default();
        let err = env.require_any(&["GOOGLE_PROJECT", "GCLOUD_PROJECT"]).unwrap_err();
        match err {
            HarnessError::MissingEnv { names } => assert_eq!(names.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_skip_toggles_from_environment() {
        let env = Environment::from_pairs([
            ("SKIP_create_test_copy", "1"),
            ("SKIP_cleanup", ""),
            ("SKIP_", "x"),
            ("PATH", "/usr/bin"),
        ]);
        let skip = SkipToggles::from_environment(&env);

        assert!(skip.is_skipped("create_test_copy"));
        assert!(!skip.is_skipped("cleanup"));
        assert!(!skip.is_skipped("terraform_apply"));
    }

    #[test]
    fn test_skip_toggles_normalized_match() {
        let skip = SkipToggles::none().skip("verify_cert_manager");
        assert!(skip.is_skipped("verify cert-manager"));
        assert!(!skip.is_skipped("verify_istio"));
    }

    #[test]
    fn test_variable_for() {
        assert_eq!(SkipToggles::variable_for("cleanup"), "SKIP_cleanup");
    }

    #[test]
    fn test_harness_config_from_environment() {
        let env = Environment::from_pairs([
            (WORKING_ROOT_VAR, "/tmp/runs"),
            (LOG_FORMAT_VAR, "JSON"),
            ("SKIP_terraform_apply", "true"),
        ]);
        let config = HarnessConfig::from_environment(&env);

        assert_eq!(config.working_root, PathBuf::from("/tmp/runs"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.skip.is_skipped("terraform_apply"));
        assert_eq!(
            config.working_dir("gke_test"),
            PathBuf::from("/tmp/runs/gke_test")
        );
    }

    #[test]
    fn test_harness_config_defaults() {
        let config = HarnessConfig::from_environment(&Environment::default());
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.working_root, PathBuf::from(DEFAULT_WORKING_ROOT));
    }
}
