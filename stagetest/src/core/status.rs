//! Stage status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of passing a stage through the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not reached yet.
    #[default]
    Pending,
    /// Ran and succeeded.
    Ok,
    /// Bypassed by a skip toggle.
    Skip,
    /// Ran and returned an error or panicked.
    Fail,
}

impl StageStatus {
    /// Returns the serialized name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ok => "ok",
            Self::Skip => "skip",
            Self::Fail => "fail",
        }
    }

    /// Returns the fixed-width tag used in run summaries.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Pending => "....",
            Self::Ok => "PASS",
            Self::Skip => "SKIP",
            Self::Fail => "FAIL",
        }
    }

    /// Returns true unless the stage failed.
    #[must_use]
    pub fn is_success(self) -> bool {
        self != Self::Fail
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
