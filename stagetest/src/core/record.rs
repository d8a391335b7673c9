//! Per-stage run records.

use serde::{Deserialize, Serialize};

use super::StageStatus;

/// What happened when a stage passed through the gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Final status.
    pub status: StageStatus,
    /// Wall-clock duration in milliseconds, zero when skipped.
    pub duration_ms: f64,
    /// Error message of a failed stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set for stages that ran as deferred cleanup.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deferred: bool,
}

impl StageRecord {
    fn new(name: String, status: StageStatus, duration_ms: f64, error: Option<String>) -> Self {
        Self {
            name,
            status,
            duration_ms,
            error,
            deferred: false,
        }
    }

    /// The stage succeeded.
    #[must_use]
    pub fn ok(name: impl Into<String>, duration_ms: f64) -> Self {
        Self::new(name.into(), StageStatus::Ok, duration_ms, None)
    }

    /// The stage was toggled off.
    #[must_use]
    pub fn skipped(name: impl Into<String>) -> Self {
        Self::new(name.into(), StageStatus::Skip, 0.0, None)
    }

    /// The stage failed with `error`.
    #[must_use]
    pub fn failed(name: impl Into<String>, duration_ms: f64, error: impl Into<String>) -> Self {
        Self::new(
            name.into(),
            StageStatus::Fail,
            duration_ms,
            Some(error.into()),
        )
    }

    /// Marks the record as belonging to a deferred stage.
    #[must_use]
    pub fn as_deferred(mut self) -> Self {
        self.deferred = true;
        self
    }
}
