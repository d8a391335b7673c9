//! Error types for the stagetest harness.
//!
//! Every failure that crosses a stage boundary is a [`HarnessError`]. The
//! variants fall into the categories reported by [`HarnessError::category`]:
//! setup problems abort the scenario immediately, external tool failures carry
//! the tool's own diagnostics, and assertion failures carry every independent
//! check that did not hold.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::checks::AssertionFailure;

/// The main error type for stagetest operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// None of the accepted environment variables is set.
    #[error("Missing required environment variable: set one of {}", .names.join(", "))]
    MissingEnv {
        /// The accepted variable names, in lookup order.
        names: Vec<String>,
    },

    /// A scratch state key was read before any stage wrote it.
    #[error(
        "Scratch state '{key}' not found at {}: the stage that produces it has not run",
        .path.display()
    )]
    MissingState {
        /// The missing key.
        key: String,
        /// The file the key maps to.
        path: PathBuf,
    },

    /// A scratch state key that cannot be mapped to a file name.
    #[error("Invalid scratch state key '{0}'")]
    InvalidKey(String),

    /// A provisioning operation was attempted from the wrong lifecycle state.
    #[error("Cannot {operation} while provisioning is {state}")]
    InvalidTransition {
        /// The attempted operation.
        operation: String,
        /// The current lifecycle state.
        state: String,
    },

    /// Tool output did not contain what the harness expected to parse.
    #[error("Unable to parse {what} from output")]
    Parse {
        /// What was being parsed.
        what: String,
    },

    /// An external tool failed.
    #[error("{0}")]
    Tool(#[from] ToolError),

    /// The cluster API failed.
    #[error("{0}")]
    Cluster(#[from] ClusterError),

    /// One or more independent checks failed within a stage.
    #[error("{} check(s) failed in '{stage}': {}", .failures.len(), join_failures(.failures))]
    Assertions {
        /// The stage that ran the checks.
        stage: String,
        /// Every check that did not hold.
        failures: Vec<AssertionFailure>,
    },

    /// A stage's work returned an error.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        /// The failing stage.
        stage: String,
        /// The underlying error.
        #[source]
        source: Box<HarnessError>,
    },

    /// Several failures surfaced together (typically scenario body + cleanup).
    #[error("{} failures: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<HarnessError>),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad classes of harness failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing environment, missing scratch state, stage-ordering violations.
    Setup,
    /// Non-zero exit or API failure from an external system.
    ExternalTool,
    /// Expected state did not hold.
    Assertion,
    /// More than one failure, of different categories.
    Aggregate,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => write!(f, "setup"),
            Self::ExternalTool => write!(f, "external_tool"),
            Self::Assertion => write!(f, "assertion"),
            Self::Aggregate => write!(f, "aggregate"),
        }
    }
}

impl HarnessError {
    /// Wraps an error as the failure of the named stage.
    #[must_use]
    pub fn stage_failed(stage: impl Into<String>, source: Self) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Returns the category of this error, looking through stage wrappers.
    ///
    /// An aggregate whose members all share one category has that category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingEnv { .. }
            | Self::MissingState { .. }
            | Self::InvalidKey(_)
            | Self::InvalidTransition { .. }
            | Self::Serialization(_)
            | Self::Io(_) => ErrorCategory::Setup,
            Self::Tool(_) | Self::Cluster(_) | Self::Parse { .. } => ErrorCategory::ExternalTool,
            Self::Assertions { .. } => ErrorCategory::Assertion,
            Self::StageFailed { source, .. } => source.category(),
            Self::Multiple(errors) => {
                let mut categories = errors.iter().map(Self::category);
                match categories.next() {
                    Some(first) if categories.all(|c| c == first) => first,
                    _ => ErrorCategory::Aggregate,
                }
            }
        }
    }

    /// Returns the innermost error behind any stage wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns every assertion failure carried by this error, including
    /// those nested inside stage wrappers and aggregates.
    #[must_use]
    pub fn assertion_failures(&self) -> Vec<&AssertionFailure> {
        match self {
            Self::Assertions { failures, .. } => failures.iter().collect(),
            Self::StageFailed { source, .. } => source.assertion_failures(),
            Self::Multiple(errors) => errors.iter().flat_map(Self::assertion_failures).collect(),
            _ => Vec::new(),
        }
    }

    /// Combines two optional failures into at most one error.
    #[must_use]
    pub fn combine(first: Option<Self>, second: Option<Self>) -> Option<Self> {
        match (first, second) {
            (None, None) => None,
            (Some(e), None) | (None, Some(e)) => Some(e),
            (Some(a), Some(b)) => {
                let mut errors = Vec::new();
                for e in [a, b] {
                    match e {
                        Self::Multiple(inner) => errors.extend(inner),
                        other => errors.push(other),
                    }
                }
                Some(Self::Multiple(errors))
            }
        }
    }
}

fn join_failures(failures: &[AssertionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_errors(errors: &[HarnessError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Failure of an external command-line tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The process could not be started at all.
    #[error("Failed to launch '{command}': {source}")]
    Launch {
        /// The rendered command line.
        command: String,
        /// The spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully.
    #[error("'{command}' exited with {}:\n{}", exit_label(.code.as_ref()), diagnostics(.stdout, .stderr))]
    NonZeroExit {
        /// The rendered command line.
        command: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
}

fn exit_label(code: Option<&i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}"))
}

fn diagnostics(stdout: &str, stderr: &str) -> String {
    if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    }
}

/// Failure talking to the Kubernetes API.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The client could not be configured from the kubeconfig.
    #[error("Failed to create Kubernetes client: {0}")]
    Client(String),

    /// The requested object does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// Any other API failure.
    #[error("Kubernetes API error: {0}")]
    Api(String),
}
