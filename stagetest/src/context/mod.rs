//! State carried between stages.
//!
//! Stages of one scenario may run in different process invocations, so
//! everything a later stage needs from an earlier one goes through
//! [`ScratchState`], which persists values as JSON files in the scenario's
//! working directory.

mod scratch;

pub use scratch::{ScratchState, KUBECTL_OPTIONS_KEY, TERRAFORM_OPTIONS_KEY, TEST_DATA_DIR};
