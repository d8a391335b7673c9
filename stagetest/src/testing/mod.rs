//! Testing utilities for staged scenarios.
//!
//! This module provides:
//! - A scripted command runner and an in-memory cluster
//! - A throwaway workspace with a fake module and kubeconfig
//! - Assertions over scenario reports

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_all_passed, assert_stage_order, assert_stage_skipped, assert_stage_status,
};
pub use fixtures::TestWorkspace;
pub use mocks::{FakeClusterClient, ScriptedRunner};
