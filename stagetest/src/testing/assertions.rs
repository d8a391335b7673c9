//! Assertions over scenario reports.

use crate::core::StageStatus;
use crate::scenario::ScenarioReport;

/// Asserts the last recorded status of a stage.
pub fn assert_stage_status(report: &ScenarioReport, stage: &str, expected: StageStatus) {
    let actual = report.status_of(stage);
    assert_eq!(
        actual, expected,
        "Expected stage '{stage}' to be {expected:?}, got {actual:?}"
    );
}

/// Asserts that a stage was skipped.
pub fn assert_stage_skipped(report: &ScenarioReport, stage: &str) {
    assert_stage_status(report, stage, StageStatus::Skip);
}

/// Asserts the exact order in which stages were recorded.
pub fn assert_stage_order(report: &ScenarioReport, expected: &[&str]) {
    let actual: Vec<&str> = report.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(actual, expected, "Unexpected stage order");
}

/// Asserts that no stage failed.
pub fn assert_all_passed(report: &ScenarioReport) {
    let failed: Vec<_> = report
        .records
        .iter()
        .filter(|r| r.status == StageStatus::Fail)
        .map(|r| (r.name.as_str(), r.error.as_deref().unwrap_or_default()))
        .collect();
    assert!(failed.is_empty(), "Expected every stage to pass, failed: {failed:?}");
}
