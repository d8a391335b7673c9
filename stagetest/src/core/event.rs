//! Stage lifecycle events.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::Timestamp;

/// What happened to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageEventKind {
    /// The stage's work began.
    #[serde(rename = "stage.started")]
    Started,
    /// The stage's work returned `Ok`.
    #[serde(rename = "stage.completed")]
    Completed,
    /// The stage's work returned an error or panicked.
    #[serde(rename = "stage.failed")]
    Failed,
    /// A skip toggle bypassed the stage.
    #[serde(rename = "stage.skipped")]
    Skipped,
}

impl StageEventKind {
    /// Returns the dotted event name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "stage.started",
            Self::Completed => "stage.completed",
            Self::Failed => "stage.failed",
            Self::Skipped => "stage.skipped",
        }
    }
}

impl fmt::Display for StageEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event published by the stage gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: StageEventKind,
    /// Stage name.
    pub stage: String,
    /// When it happened.
    pub timestamp: Timestamp,
    /// Whether the stage is a deferred cleanup stage.
    #[serde(default)]
    pub deferred: bool,
    /// Duration of a completed stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Failure message or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StageEvent {
    fn new(kind: StageEventKind, stage: &str) -> Self {
        Self {
            kind,
            stage: stage.to_string(),
            timestamp: chrono::Utc::now(),
            deferred: false,
            duration_ms: None,
            detail: None,
        }
    }

    /// The stage began.
    #[must_use]
    pub fn started(stage: &str) -> Self {
        Self::new(StageEventKind::Started, stage)
    }

    /// The stage finished successfully.
    #[must_use]
    pub fn completed(stage: &str, duration_ms: f64) -> Self {
        Self {
            duration_ms: Some(duration_ms),
            ..Self::new(StageEventKind::Completed, stage)
        }
    }

    /// The stage failed.
    #[must_use]
    pub fn failed(stage: &str, error: &str) -> Self {
        Self {
            detail: Some(error.to_string()),
            ..Self::new(StageEventKind::Failed, stage)
        }
    }

    /// The stage was skipped.
    #[must_use]
    pub fn skipped(stage: &str, reason: &str) -> Self {
        Self {
            detail: Some(reason.to_string()),
            ..Self::new(StageEventKind::Skipped, stage)
        }
    }

    /// Marks the event as belonging to a deferred stage.
    #[must_use]
    pub fn deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_event() {
        let event = StageEvent::skipped("terraform_apply", "SKIP_terraform_apply is set");
        assert_eq!(event.kind, StageEventKind::Skipped);
        assert_eq!(event.stage, "terraform_apply");
        assert_eq!(event.detail.as_deref(), Some("SKIP_terraform_apply is set"));
        assert!(!event.deferred);
    }

    #[test]
    fn test_event_serializes_type_field() {
        let event = StageEvent::completed("cleanup", 12.5).deferred(true);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "stage.completed");
        assert_eq!(value["stage"], "cleanup");
        assert_eq!(value["deferred"], true);
        assert_eq!(value["duration_ms"], 12.5);
        assert!(value.get("detail").is_none());

        let back: StageEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
