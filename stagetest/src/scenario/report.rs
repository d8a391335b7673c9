//! Scenario summary reporting.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::core::{StageRecord, StageStatus};

/// Outcome of every stage of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: String,
    /// Identifier of the run.
    pub run_id: Uuid,
    /// Stage records in execution order.
    pub records: Vec<StageRecord>,
}

impl ScenarioReport {
    /// Creates a report.
    #[must_use]
    pub fn new(scenario: String, run_id: Uuid, records: Vec<StageRecord>) -> Self {
        Self {
            scenario,
            run_id,
            records,
        }
    }

    fn count(&self, status: StageStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Number of stages that ran successfully.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(StageStatus::Ok)
    }

    /// Number of skipped stages.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(StageStatus::Skip)
    }

    /// Number of failed stages.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(StageStatus::Fail)
    }

    /// Last status of the named stage, `Pending` if it was never reached.
    #[must_use]
    pub fn status_of(&self, name: &str) -> StageStatus {
        self.records
            .iter()
            .rev()
            .find(|r| r.name == name)
            .map_or(StageStatus::Pending, |r| r.status)
    }

    /// Total duration of all stages in milliseconds.
    #[must_use]
    pub fn total_duration_ms(&self) -> f64 {
        self.records.iter().map(|r| r.duration_ms).sum()
    }

    /// Logs a summary table.
    pub fn log_summary(&self) {
        info!("========================================");
        info!("  {}  (run {})", self.scenario.to_uppercase(), self.run_id);
        info!("========================================");
        for r in &self.records {
            let tag = r.status.tag();
            let suffix = if r.deferred { " (deferred)" } else { "" };
            info!(
                "  {tag}  {:40} {:.1}s{suffix}",
                r.name,
                r.duration_ms / 1000.0
            );
            if let Some(ref e) = r.error {
                let truncated: String = e.chars().take(200).collect();
                info!("        -> {truncated}");
            }
        }
        info!("----------------------------------------");
        info!(
            "  {} passed, {} skipped, {} failed ({:.1}s total)",
            self.passed(),
            self.skipped(),
            self.failed(),
            self.total_duration_ms() / 1000.0
        );
        info!("========================================");
    }
}
